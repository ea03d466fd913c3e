//! DTC REST client — request building and response checking

use crate::config::redact;
use crate::error::ApiFailure;
use crate::transport::ApiResult;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use std::time::Duration;

/// Low-level client for the DTC task API
///
/// Owns the connection pool, base URL and credential. Every request
/// carries `Authorization: <api key>`.
pub struct DtcClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DtcClient {
    /// Build a client for `base_url` with a per-request timeout
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("aparavi-dtc/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiFailure::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Start a request to `path` with the auth header set
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, self.api_key.as_str())
    }

    /// Start a JSON-bodied request
    pub fn json_request(
        &self,
        method: Method,
        path: &str,
        body: &serde_json::Value,
    ) -> RequestBuilder {
        self.request(method, path).json(body)
    }

    /// Start a plain-text-bodied request
    pub fn text_request(&self, method: Method, path: &str, text: &str) -> RequestBuilder {
        self.request(method, path)
            .header(CONTENT_TYPE, "text/plain")
            .body(text.to_string())
    }

    /// Send a request and return the response if its status is a success
    pub async fn execute(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(self.scrub(&e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), body = %body, "Request rejected");
            return Err(ApiFailure::http(status.as_u16(), body));
        }

        Ok(response)
    }

    /// Send a request and parse the JSON body of a success response
    pub async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> ApiResult<T> {
        let response = self.execute(request).await?;
        let text = response
            .text()
            .await
            .map_err(|e| ApiFailure::Transport(self.scrub(&e.to_string())))?;
        serde_json::from_str(&text).map_err(|e| ApiFailure::Decode(format!("{}: {}", e, text)))
    }

    /// Replace the API key in text that may contain a request URL
    pub fn scrub(&self, text: &str) -> String {
        if self.api_key.is_empty() {
            return text.to_string();
        }
        text.replace(&self.api_key, &redact(&self.api_key))
    }
}
