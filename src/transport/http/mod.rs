//! HTTP transport for the DTC service
//!
//! Implements `PipelineTransport` over the service's REST surface:
//!
//! | Call | Request |
//! |---|---|
//! | validate | `POST /pipe/validate` |
//! | execute | `PUT /task` with `{ pipeline }` |
//! | status | `GET /task?token=&type=` |
//! | send | `PUT /webhook?type=&apikey=&token=` (text/plain) |
//! | teardown | `DELETE /task?type=&token=` |

mod client;

pub use client::DtcClient;

use crate::config::DtcConfig;
use crate::error::{ApiFailure, DtcError, Result};
use crate::pipeline::PipelineDefinition;
use crate::transport::{ApiResult, PipelineTransport};
use crate::types::{LaunchResponse, SessionHandle, TaskStatus};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

/// Status responses wrap the task status in `data`
#[derive(Deserialize)]
struct StatusEnvelope {
    data: Option<TaskStatus>,
}

/// HTTP transport backed by `reqwest`
pub struct HttpTransport {
    client: DtcClient,
}

impl HttpTransport {
    /// Build from a validated configuration
    pub fn from_config(config: &DtcConfig) -> Result<Self> {
        config.validate()?;
        let client = DtcClient::new(&config.base_url, &config.api_key, config.request_timeout())
            .map_err(|e| DtcError::Config(e.to_string()))?;

        tracing::debug!(base_url = %client.base_url(), "HTTP transport ready");
        Ok(Self { client })
    }

    /// Get the underlying client for advanced usage
    pub fn client(&self) -> &DtcClient {
        &self.client
    }
}

#[async_trait]
impl PipelineTransport for HttpTransport {
    async fn validate(&self, definition: &PipelineDefinition) -> ApiResult<serde_json::Value> {
        let request = self
            .client
            .json_request(Method::POST, "/pipe/validate", definition.as_value());
        self.client.execute_json(request).await
    }

    async fn execute(&self, definition: &PipelineDefinition) -> ApiResult<LaunchResponse> {
        let request = self
            .client
            .json_request(Method::PUT, "/task", &definition.launch_body());
        self.client.execute_json(request).await
    }

    async fn status(&self, handle: &SessionHandle) -> ApiResult<TaskStatus> {
        let request = self
            .client
            .request(Method::GET, "/task")
            .query(&[("token", handle.token.as_str()), ("type", handle.kind.as_str())]);

        let envelope: StatusEnvelope = self.client.execute_json(request).await?;
        envelope
            .data
            .ok_or_else(|| ApiFailure::Decode("status response has no data".to_string()))
    }

    async fn send(&self, handle: &SessionHandle, text: &str) -> ApiResult<serde_json::Value> {
        let request = self
            .client
            .text_request(Method::PUT, "/webhook", text)
            .query(&[
                ("type", handle.kind.as_str()),
                ("apikey", self.client.api_key()),
                ("token", handle.token.as_str()),
            ]);

        tracing::debug!(
            url = %self.client.scrub(&format!(
                "{}/webhook?type={}&apikey={}&token={}",
                self.client.base_url(),
                handle.kind,
                self.client.api_key(),
                handle.token
            )),
            bytes = text.len(),
            "Sending text to pipeline webhook"
        );

        self.client.execute_json(request).await
    }

    async fn teardown(&self, handle: &SessionHandle) -> ApiResult<()> {
        let request = self
            .client
            .request(Method::DELETE, "/task")
            .query(&[("type", handle.kind.as_str()), ("token", handle.token.as_str())]);

        self.client.execute(request).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
