//! Pipeline session — the lifecycle of one remote pipeline task
//!
//! `PipelineSession` validates and launches a pipeline, waits for it to
//! report Running, relays text through its webhook and releases it again.
//!
//! ```text
//! Idle ──start()──▶ Launching ──ready──▶ Active
//!   ▲                   │                  │
//!   └────────── tear_down() ◀──────────────┘
//! ```
//!
//! State sits behind an async lock that is never held across a network
//! call. Concurrent `send()` calls on one session are not serialized here;
//! that is only safe when the service serializes them itself.

use crate::config::DtcConfig;
use crate::error::{ApiFailure, DtcError, Result};
use crate::pipeline::PipelineDefinition;
use crate::transport::http::HttpTransport;
use crate::transport::PipelineTransport;
use crate::types::{SendOutcome, SessionHandle, TaskState, TaskStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No remote task
    Idle,
    /// Task launched, not yet reported Running
    Launching,
    /// Task running and accepting text
    Active,
}

/// Timing of the start-up wait
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Delay between status checks
    pub poll_interval: Duration,

    /// Overall limit for the task to reach Running
    pub start_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            start_timeout: Duration::from_secs(10 * 60),
        }
    }
}

impl From<&DtcConfig> for SessionOptions {
    fn from(config: &DtcConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            start_timeout: config.start_timeout(),
        }
    }
}

#[derive(Debug)]
struct SessionState {
    /// Token and type tag, always set together
    handle: Option<SessionHandle>,
    phase: SessionPhase,
}

impl SessionState {
    fn idle() -> Self {
        Self {
            handle: None,
            phase: SessionPhase::Idle,
        }
    }
}

/// One remote pipeline task and the calls that drive it
pub struct PipelineSession {
    transport: Arc<dyn PipelineTransport>,
    definition: PipelineDefinition,
    options: SessionOptions,
    state: RwLock<SessionState>,
}

impl PipelineSession {
    /// Create an idle session over any transport
    pub fn new(
        transport: Arc<dyn PipelineTransport>,
        definition: PipelineDefinition,
        options: SessionOptions,
    ) -> Self {
        Self {
            transport,
            definition,
            options,
            state: RwLock::new(SessionState::idle()),
        }
    }

    /// Create an idle HTTP session from configuration
    ///
    /// Uses `pipeline_file` when set, otherwise the embedded definition.
    pub fn from_config(config: &DtcConfig) -> Result<Self> {
        let transport = HttpTransport::from_config(config)?;
        let definition = match &config.pipeline_file {
            Some(path) => PipelineDefinition::from_file(path)?,
            None => PipelineDefinition::embedded()?,
        };
        Ok(Self::new(
            Arc::new(transport),
            definition,
            SessionOptions::from(config),
        ))
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Get the transport name
    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.read().await.phase
    }

    /// Current token and type tag, if a task is launched
    pub async fn handle(&self) -> Option<SessionHandle> {
        self.state.read().await.handle.clone()
    }

    /// Non-blocking variant of `handle()` for use outside async contexts
    ///
    /// Returns `None` when the state is momentarily locked for writing.
    pub fn try_handle(&self) -> Option<SessionHandle> {
        self.state.try_read().ok().and_then(|s| s.handle.clone())
    }

    pub async fn is_active(&self) -> bool {
        self.phase().await == SessionPhase::Active
    }

    /// Run only the remote validation of the definition
    pub async fn validate(&self) -> Result<serde_json::Value> {
        self.transport
            .validate(&self.definition)
            .await
            .map_err(DtcError::Validation)
    }

    /// Validate, launch and wait until the pipeline is Running
    ///
    /// On success the session is Active and the final task status is
    /// returned. A timeout leaves the session Launching with its token
    /// kept, so the caller still has to tear it down.
    pub async fn start(&self) -> Result<TaskStatus> {
        self.start_with_cancel(&CancellationToken::new()).await
    }

    /// `start()` whose wait for Running also ends when `cancel` fires
    ///
    /// Cancellation leaves the session Launching, like a timeout.
    pub async fn start_with_cancel(&self, cancel: &CancellationToken) -> Result<TaskStatus> {
        if self.state.read().await.handle.is_some() {
            return Err(DtcError::AlreadyStarted);
        }

        let components = self.definition.components();
        tracing::info!(
            transport = self.transport.name(),
            source = ?self.definition.source_component(),
            components = %components.iter().map(|c| c.id).collect::<Vec<_>>().join(","),
            "Pipeline definition loaded"
        );

        let verdict = self.validate().await?;
        tracing::info!(result = %verdict, "Pipeline validation successful");

        let launch = self
            .transport
            .execute(&self.definition)
            .await
            .map_err(DtcError::Execution)?;

        let Some(handle) = launch.handle() else {
            let failure = match launch.first_error() {
                Some(message) => ApiFailure::Rejected(message),
                None => ApiFailure::Decode("launch response carried no token".to_string()),
            };
            return Err(DtcError::Execution(failure));
        };

        {
            let mut state = self.state.write().await;
            if state.handle.is_some() {
                // Another start() won the race; release what we just launched.
                drop(state);
                if let Err(e) = self.transport.teardown(&handle).await {
                    tracing::warn!(token = %handle.token, error = %e, "Failed to release duplicate launch");
                }
                return Err(DtcError::AlreadyStarted);
            }
            state.handle = Some(handle.clone());
            state.phase = SessionPhase::Launching;
        }

        tracing::info!(token = %handle.token, kind = %handle.kind, "Pipeline started");

        if let Some(message) = launch.first_error() {
            tracing::error!(token = %handle.token, error = %message, "Launch reported errors");
            return Err(DtcError::Execution(ApiFailure::Rejected(message)));
        }

        let status = self.wait_for_running(&handle, cancel).await?;

        {
            let mut state = self.state.write().await;
            if state.handle.as_ref() == Some(&handle) {
                state.phase = SessionPhase::Active;
            }
        }

        tracing::info!(status = %status.status, "Pipeline is running");
        Ok(status)
    }

    async fn wait_for_running(
        &self,
        handle: &SessionHandle,
        cancel: &CancellationToken,
    ) -> Result<TaskStatus> {
        tracing::info!("Waiting for pipeline to reach Running status");

        let started = Instant::now();
        let mut last_status: Option<TaskState> = None;

        loop {
            let status = self
                .transport
                .status(handle)
                .await
                .map_err(DtcError::Status)?;

            if status.is_ready() {
                return Ok(status);
            }

            let elapsed = started.elapsed();
            if elapsed > self.options.start_timeout {
                return Err(DtcError::Timeout {
                    waited: self.options.start_timeout,
                    last_status: Some(status.status),
                });
            }

            tracing::info!(
                status = %status.status,
                elapsed_secs = elapsed.as_secs(),
                "Pipeline not running yet"
            );
            last_status = Some(status.status);

            tokio::select! {
                _ = tokio::time::sleep(self.options.poll_interval) => {}
                _ = cancel.cancelled() => {
                    tracing::warn!(last_status = ?last_status, "Wait for Running cancelled");
                    return Err(DtcError::Cancelled);
                }
            }
        }
    }

    /// Fetch the task status once
    pub async fn status(&self) -> Result<TaskStatus> {
        let handle = self.handle().await.ok_or(DtcError::NotActive)?;
        self.transport
            .status(&handle)
            .await
            .map_err(DtcError::Status)
    }

    /// Send text through the pipeline
    ///
    /// Returns the anonymized text, or the raw response body when the text
    /// cannot be found in it.
    pub async fn send(&self, text: &str) -> Result<SendOutcome> {
        let (handle, phase) = {
            let state = self.state.read().await;
            match &state.handle {
                Some(handle) => (handle.clone(), state.phase),
                None => return Err(DtcError::NotActive),
            }
        };

        if phase != SessionPhase::Active {
            tracing::warn!(token = %handle.token, "Sending to a pipeline that has not reported Running");
        }

        let body = self
            .transport
            .send(&handle, text)
            .await
            .map_err(DtcError::Request)?;

        tracing::debug!(response = %body, "Webhook response received");

        let outcome = SendOutcome::from_response(body);
        if !outcome.is_anonymized() {
            tracing::warn!("Could not extract anonymized text from response, returning full response");
        }
        Ok(outcome)
    }

    /// Release the remote task
    ///
    /// A no-op when nothing is launched. On failure the token is kept so
    /// the teardown can be retried.
    pub async fn tear_down(&self) -> Result<()> {
        let Some(handle) = self.handle().await else {
            tracing::debug!("No active pipeline to tear down");
            return Ok(());
        };

        tracing::info!(token = %handle.token, kind = %handle.kind, "Tearing down pipeline");

        if let Err(e) = self.transport.teardown(&handle).await {
            tracing::error!(token = %handle.token, error = %e, "Pipeline teardown failed");
            return Err(DtcError::Teardown(e));
        }

        let mut state = self.state.write().await;
        if state.handle.as_ref() == Some(&handle) {
            *state = SessionState::idle();
        }
        drop(state);

        tracing::info!(token = %handle.token, "Pipeline teardown successful");
        Ok(())
    }

    /// Best-effort `tear_down()` for shutdown paths; never fails
    pub async fn cleanup(&self) {
        if self.handle().await.is_none() {
            return;
        }
        if let Err(e) = self.tear_down().await {
            tracing::warn!(error = %e, "Cleanup warning");
        }
    }
}

impl std::fmt::Debug for PipelineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSession")
            .field("transport", &self.transport.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryTransport;

    fn session(transport: Arc<MemoryTransport>) -> PipelineSession {
        PipelineSession::new(
            transport,
            PipelineDefinition::embedded().unwrap(),
            SessionOptions::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_lifecycle() {
        let transport = Arc::new(MemoryTransport::new());
        let session = session(transport.clone());
        assert_eq!(session.phase().await, SessionPhase::Idle);

        let status = session.start().await.unwrap();
        assert_eq!(status.status, TaskState::Running);
        assert_eq!(session.phase().await, SessionPhase::Active);
        assert!(session.handle().await.is_some());

        let outcome = session.send("Jane Doe").await.unwrap();
        assert_eq!(outcome.as_text(), Some("Jane Doe"));

        session.tear_down().await.unwrap();
        assert_eq!(session.phase().await, SessionPhase::Idle);
        assert!(session.handle().await.is_none());
        assert!(transport.live_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let transport = Arc::new(MemoryTransport::new());
        let session = session(transport.clone());
        session.start().await.unwrap();

        assert!(matches!(session.start().await, Err(DtcError::AlreadyStarted)));
        assert_eq!(transport.calls().await.execute, 1);
    }

    #[tokio::test]
    async fn test_launch_without_token_stays_idle() {
        let transport = Arc::new(MemoryTransport::new().with_launch(Default::default()));
        let session = session(transport.clone());

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, DtcError::Execution(_)));
        assert_eq!(session.phase().await, SessionPhase::Idle);
        assert_eq!(transport.calls().await.status, 0);
    }

    #[tokio::test]
    async fn test_status_failure_keeps_launching() {
        let transport = Arc::new(
            MemoryTransport::new().with_status_failure(ApiFailure::http(503, "busy")),
        );
        let session = session(transport.clone());

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, DtcError::Status(_)));
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(session.phase().await, SessionPhase::Launching);
        assert!(session.handle().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_wait() {
        let transport = Arc::new(
            MemoryTransport::new().with_statuses([TaskStatus::new("Pending", false)]),
        );
        let session = session(transport.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let err = session.start_with_cancel(&cancel).await.unwrap_err();
        assert!(matches!(err, DtcError::Cancelled));
        assert_eq!(session.phase().await, SessionPhase::Launching);
        assert_eq!(transport.calls().await.status, 3);
    }

    #[tokio::test]
    async fn test_send_while_launching_is_allowed() {
        let transport = Arc::new(
            MemoryTransport::new().with_status_failure(ApiFailure::Transport("reset".into())),
        );
        let session = session(transport.clone());
        assert!(session.start().await.is_err());

        let outcome = session.send("early").await.unwrap();
        assert_eq!(outcome.as_text(), Some("early"));
    }

    #[tokio::test]
    async fn test_status_requires_handle() {
        let session = session(Arc::new(MemoryTransport::new()));
        assert!(matches!(session.status().await, Err(DtcError::NotActive)));
        assert!(session.try_handle().is_none());
    }

    #[tokio::test]
    async fn test_validate_only() {
        let transport = Arc::new(MemoryTransport::new());
        let session = session(transport.clone());
        let verdict = session.validate().await.unwrap();
        assert_eq!(verdict["status"], "OK");
        assert_eq!(transport.calls().await.execute, 0);
        assert_eq!(session.phase().await, SessionPhase::Idle);
    }
}
