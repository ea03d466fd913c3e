//! Pipeline transport trait — the remote calls a session is built on
//!
//! The HTTP transport talks to the DTC service; the memory transport
//! plays the service in-process for tests and offline runs.

use crate::error::ApiFailure;
use crate::pipeline::PipelineDefinition;
use crate::types::{LaunchResponse, SessionHandle, TaskStatus};
use async_trait::async_trait;

pub mod http;
pub mod memory;

/// Result of a single remote call
pub type ApiResult<T> = std::result::Result<T, ApiFailure>;

/// The five calls of the pipeline task API
///
/// Implementations report failures as `ApiFailure`; `PipelineSession`
/// decides which operation error they become.
#[async_trait]
pub trait PipelineTransport: Send + Sync {
    /// Pre-flight check of a definition, returning the service's verdict
    async fn validate(&self, definition: &PipelineDefinition) -> ApiResult<serde_json::Value>;

    /// Launch a pipeline task from a definition
    async fn execute(&self, definition: &PipelineDefinition) -> ApiResult<LaunchResponse>;

    /// Fetch the current status of a launched task
    async fn status(&self, handle: &SessionHandle) -> ApiResult<TaskStatus>;

    /// Push raw text into the task's webhook, returning the parsed response
    async fn send(&self, handle: &SessionHandle, text: &str) -> ApiResult<serde_json::Value>;

    /// Release the task on the service
    async fn teardown(&self, handle: &SessionHandle) -> ApiResult<()>;

    /// Transport name (e.g., "http", "memory")
    fn name(&self) -> &str;
}
