//! Error types for aparavi-dtc

use crate::types::TaskState;
use std::time::Duration;
use thiserror::Error;

/// Why a single remote call failed
///
/// Produced by a `PipelineTransport`; the session wraps it in the
/// `DtcError` variant of the operation that issued the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiFailure {
    /// The service answered with a non-success HTTP status
    #[error("{status} {status_text} - {body}")]
    Http {
        status: u16,
        status_text: String,
        /// Raw response body text
        body: String,
    },

    /// No response was received (connect, timeout, IO)
    #[error("transport error: {0}")]
    Transport(String),

    /// A success response whose body did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),

    /// A success response that reported an error in its body
    #[error("{0}")]
    Rejected(String),
}

impl ApiFailure {
    /// Build an HTTP failure, filling the reason phrase from the status code
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        let status_text = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
            .to_string();
        Self::Http {
            status,
            status_text,
            body: body.into(),
        }
    }

    /// HTTP status code, if the service responded
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body, if the service responded
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Http { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Errors that can occur while driving a pipeline session
#[derive(Debug, Error)]
pub enum DtcError {
    /// Remote pre-flight validation rejected the definition
    #[error("Pipeline validation failed: {0}")]
    Validation(#[source] ApiFailure),

    /// Launch failed, or the launch response reported errors
    #[error("Pipeline execution failed: {0}")]
    Execution(#[source] ApiFailure),

    /// The pipeline did not reach Running in time
    #[error("Pipeline failed to reach Running status within {waited:?} (last status: {})", state_label(.last_status))]
    Timeout {
        waited: Duration,
        last_status: Option<TaskState>,
    },

    /// Operation requires a launched pipeline
    #[error("No active pipeline. Call start() first")]
    NotActive,

    /// Webhook request failed
    #[error("Webhook request failed: {0}")]
    Request(#[source] ApiFailure),

    /// Remote teardown failed; the session keeps its token
    #[error("Pipeline teardown failed: {0}")]
    Teardown(#[source] ApiFailure),

    /// Task status check failed
    #[error("Status check failed: {0}")]
    Status(#[source] ApiFailure),

    /// `start()` called while a pipeline is already launched
    #[error("Pipeline already started; tear it down first")]
    AlreadyStarted,

    /// Waiting for the pipeline was cancelled by the caller
    #[error("Waiting for pipeline was cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pipeline definition could not be loaded
    #[error("Pipeline definition error: {0}")]
    Pipeline(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML config parse failure
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

fn state_label(state: &Option<TaskState>) -> &str {
    state.as_ref().map(TaskState::as_str).unwrap_or("unknown")
}

impl DtcError {
    fn api_failure(&self) -> Option<&ApiFailure> {
        match self {
            Self::Validation(f)
            | Self::Execution(f)
            | Self::Request(f)
            | Self::Teardown(f)
            | Self::Status(f) => Some(f),
            _ => None,
        }
    }

    /// HTTP status code for errors sourced from a service response
    pub fn status_code(&self) -> Option<u16> {
        self.api_failure().and_then(ApiFailure::status_code)
    }

    /// Raw response body for errors sourced from a service response
    pub fn response_body(&self) -> Option<&str> {
        self.api_failure().and_then(ApiFailure::body)
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, DtcError>;
