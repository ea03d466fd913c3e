//! In-memory transport
//!
//! Plays the DTC service inside the process. Outcomes of each call can be
//! scripted up front; unscripted calls behave like a healthy service whose
//! pipeline echoes the text it receives. Every call is counted so tests can
//! assert on what the session did.

use crate::error::ApiFailure;
use crate::pipeline::PipelineDefinition;
use crate::transport::{ApiResult, PipelineTransport};
use crate::types::{LaunchResponse, SessionHandle, TaskStatus};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Task type tag assigned to unscripted launches
pub const DEFAULT_KIND: &str = "cpu";

/// Number of calls made to each endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub validate: usize,
    pub execute: usize,
    pub status: usize,
    pub send: usize,
    pub teardown: usize,
}

#[derive(Default)]
struct MemoryState {
    validation: Option<ApiFailure>,
    launches: VecDeque<ApiResult<LaunchResponse>>,
    /// The last scripted status repeats once the rest are consumed
    statuses: VecDeque<ApiResult<TaskStatus>>,
    send_responses: VecDeque<ApiResult<serde_json::Value>>,
    teardown_failures: VecDeque<ApiFailure>,
    live: Vec<SessionHandle>,
    sent: Vec<String>,
    calls: CallCounts,
}

/// Scripted in-process stand-in for the DTC service
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject validation with this failure
    pub fn with_validation_failure(mut self, failure: ApiFailure) -> Self {
        self.state.get_mut().validation = Some(failure);
        self
    }

    /// Queue a launch response; its handle (if any) becomes a live task
    pub fn with_launch(mut self, response: LaunchResponse) -> Self {
        self.state.get_mut().launches.push_back(Ok(response));
        self
    }

    /// Queue a failed launch
    pub fn with_launch_failure(mut self, failure: ApiFailure) -> Self {
        self.state.get_mut().launches.push_back(Err(failure));
        self
    }

    /// Script the status sequence; the last entry repeats
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        self.state
            .get_mut()
            .statuses
            .extend(statuses.into_iter().map(Ok));
        self
    }

    /// Queue a failed status check
    pub fn with_status_failure(mut self, failure: ApiFailure) -> Self {
        self.state.get_mut().statuses.push_back(Err(failure));
        self
    }

    /// Queue a webhook response body
    pub fn with_send_response(mut self, body: serde_json::Value) -> Self {
        self.state.get_mut().send_responses.push_back(Ok(body));
        self
    }

    /// Queue a failed webhook call
    pub fn with_send_failure(mut self, failure: ApiFailure) -> Self {
        self.state.get_mut().send_responses.push_back(Err(failure));
        self
    }

    /// Queue a failed teardown; later teardowns succeed again
    pub fn with_teardown_failure(mut self, failure: ApiFailure) -> Self {
        self.state.get_mut().teardown_failures.push_back(failure);
        self
    }

    /// Calls made so far
    pub async fn calls(&self) -> CallCounts {
        self.state.lock().await.calls
    }

    /// Texts received by the webhook, in order
    pub async fn sent(&self) -> Vec<String> {
        self.state.lock().await.sent.clone()
    }

    /// Tasks launched and not yet torn down
    pub async fn live_tasks(&self) -> Vec<SessionHandle> {
        self.state.lock().await.live.clone()
    }

    fn not_found(handle: &SessionHandle) -> ApiFailure {
        ApiFailure::http(404, format!("task {} ({}) not found", handle.token, handle.kind))
    }
}

/// Webhook body shaped like the service's: one object holding the text
pub fn echo_response(text: &str) -> serde_json::Value {
    let mut objects = serde_json::Map::new();
    objects.insert(
        format!("obj-{}", uuid::Uuid::new_v4()),
        serde_json::json!({ "text": [text] }),
    );
    serde_json::json!({ "data": { "objects": objects } })
}

#[async_trait]
impl PipelineTransport for MemoryTransport {
    async fn validate(&self, definition: &PipelineDefinition) -> ApiResult<serde_json::Value> {
        let mut state = self.state.lock().await;
        state.calls.validate += 1;

        if let Some(failure) = &state.validation {
            return Err(failure.clone());
        }

        Ok(serde_json::json!({
            "status": "OK",
            "data": { "components": definition.components().len() }
        }))
    }

    async fn execute(&self, _definition: &PipelineDefinition) -> ApiResult<LaunchResponse> {
        let mut state = self.state.lock().await;
        state.calls.execute += 1;

        let response = match state.launches.pop_front() {
            Some(scripted) => scripted?,
            None => LaunchResponse::launched(&SessionHandle::new(
                uuid::Uuid::new_v4().to_string(),
                DEFAULT_KIND,
            )),
        };

        if let Some(handle) = response.handle() {
            tracing::debug!(token = %handle.token, "Memory task launched");
            state.live.push(handle);
        }

        Ok(response)
    }

    async fn status(&self, handle: &SessionHandle) -> ApiResult<TaskStatus> {
        let mut state = self.state.lock().await;
        state.calls.status += 1;

        if !state.live.contains(handle) {
            return Err(Self::not_found(handle));
        }

        if state.statuses.len() > 1 {
            if let Some(next) = state.statuses.pop_front() {
                return next;
            }
        }

        match state.statuses.front() {
            Some(last) => last.clone(),
            None => Ok(TaskStatus::new("Running", false)),
        }
    }

    async fn send(&self, handle: &SessionHandle, text: &str) -> ApiResult<serde_json::Value> {
        let mut state = self.state.lock().await;
        state.calls.send += 1;

        if !state.live.contains(handle) {
            return Err(Self::not_found(handle));
        }

        state.sent.push(text.to_string());
        match state.send_responses.pop_front() {
            Some(scripted) => scripted,
            None => Ok(echo_response(text)),
        }
    }

    async fn teardown(&self, handle: &SessionHandle) -> ApiResult<()> {
        let mut state = self.state.lock().await;
        state.calls.teardown += 1;

        if let Some(failure) = state.teardown_failures.pop_front() {
            return Err(failure);
        }

        let before = state.live.len();
        state.live.retain(|h| h != handle);
        if state.live.len() == before {
            return Err(Self::not_found(handle));
        }

        tracing::debug!(token = %handle.token, "Memory task released");
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SendOutcome, TaskState};

    fn definition() -> PipelineDefinition {
        PipelineDefinition::embedded().unwrap()
    }

    #[tokio::test]
    async fn test_unscripted_launch_is_live() {
        let transport = MemoryTransport::new();
        let launch = transport.execute(&definition()).await.unwrap();
        let handle = launch.handle().unwrap();
        assert_eq!(handle.kind, DEFAULT_KIND);

        assert_eq!(transport.live_tasks().await, vec![handle.clone()]);
        assert_eq!(
            transport.status(&handle).await.unwrap().status,
            TaskState::Running
        );

        transport.teardown(&handle).await.unwrap();
        assert!(transport.live_tasks().await.is_empty());
        assert_eq!(transport.teardown(&handle).await.unwrap_err().status_code(), Some(404));
    }

    #[tokio::test]
    async fn test_status_script_repeats_last() {
        let transport = MemoryTransport::new().with_statuses([
            TaskStatus::new("Pending", false),
            TaskStatus::new("Running", false),
        ]);
        let handle = transport.execute(&definition()).await.unwrap().handle().unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(transport.status(&handle).await.unwrap().status);
        }
        assert_eq!(seen, vec![TaskState::Pending, TaskState::Running, TaskState::Running]);
        assert_eq!(transport.calls().await.status, 3);
    }

    #[tokio::test]
    async fn test_echo_send() {
        let transport = MemoryTransport::new();
        let handle = transport.execute(&definition()).await.unwrap().handle().unwrap();

        let body = transport.send(&handle, "hello").await.unwrap();
        assert_eq!(
            SendOutcome::from_response(body),
            SendOutcome::Anonymized("hello".into())
        );
        assert_eq!(transport.sent().await, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_handle_rejected() {
        let transport = MemoryTransport::new();
        let stranger = SessionHandle::new("nope", "cpu");
        assert!(transport.status(&stranger).await.is_err());
        assert!(transport.send(&stranger, "x").await.is_err());
        assert!(transport.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure() {
        let transport =
            MemoryTransport::new().with_validation_failure(ApiFailure::http(400, "bad graph"));
        let err = transport.validate(&definition()).await.unwrap_err();
        assert_eq!(err.body(), Some("bad graph"));
        assert_eq!(transport.calls().await.validate, 1);
    }
}
