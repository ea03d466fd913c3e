//! Wire and session types for the DTC service
//!
//! Field names follow the service's JSON (`type` is exposed as `kind`).

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifies one launched pipeline instance on the service
///
/// The token and its server-assigned type tag travel together; a session
/// either holds both or neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    /// Opaque task token
    pub token: String,

    /// Server-assigned task type tag (`type` on the wire)
    #[serde(rename = "type")]
    pub kind: String,
}

impl SessionHandle {
    pub fn new(token: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            kind: kind.into(),
        }
    }
}

/// Remote task state as reported by the status endpoint
///
/// Unrecognized names are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskState {
    Pending,
    Initializing,
    Running,
    Stopping,
    Completed,
    Failed,
    Other(String),
}

impl TaskState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Initializing => "Initializing",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Other(name) => name,
        }
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for TaskState {
    fn from(name: String) -> Self {
        match name.as_str() {
            "Pending" => Self::Pending,
            "Initializing" => Self::Initializing,
            "Running" => Self::Running,
            "Stopping" => Self::Stopping,
            "Completed" => Self::Completed,
            "Failed" => Self::Failed,
            _ => Self::Other(name),
        }
    }
}

impl From<&str> for TaskState {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<TaskState> for String {
    fn from(state: TaskState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task status payload (`data` of the status response)
///
/// Fields other than `status` and `completed` are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: TaskState,

    #[serde(default, deserialize_with = "null_as_default")]
    pub completed: bool,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TaskStatus {
    pub fn new(status: impl Into<TaskState>, completed: bool) -> Self {
        Self {
            status: status.into(),
            completed,
            extra: serde_json::Map::new(),
        }
    }

    /// The wait loop stops once the task is running or has completed
    pub fn is_ready(&self) -> bool {
        self.status == TaskState::Running || self.completed
    }
}

/// Explicit `null` reads the same as an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response body of the launch (`PUT /task`) call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchResponse {
    #[serde(default)]
    pub data: Option<LaunchData>,

    /// Server-reported problems; may accompany a valid token
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<serde_json::Value>,
}

/// Token fields of a launch response
///
/// Both are optional on the wire; `handle()` only yields a pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchData {
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl LaunchResponse {
    /// Launch response carrying a token and no errors
    pub fn launched(handle: &SessionHandle) -> Self {
        Self {
            data: Some(LaunchData {
                token: Some(handle.token.clone()),
                kind: Some(handle.kind.clone()),
            }),
            errors: Vec::new(),
        }
    }

    /// The session handle, if both token and type were returned
    pub fn handle(&self) -> Option<SessionHandle> {
        let data = self.data.as_ref()?;
        match (&data.token, &data.kind) {
            (Some(token), Some(kind)) if !token.is_empty() && !kind.is_empty() => {
                Some(SessionHandle::new(token.clone(), kind.clone()))
            }
            _ => None,
        }
    }

    /// First reported error as display text
    ///
    /// String entries are returned verbatim, anything else as compact JSON.
    pub fn first_error(&self) -> Option<String> {
        self.errors.first().map(|e| match e {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Result of sending text through the pipeline
///
/// The service nests the anonymized text at `data.objects.<first>.text[0]`.
/// When that path is missing the parsed body is handed back as-is so the
/// caller can inspect what the pipeline produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Text extracted from the first output object
    Anonymized(String),

    /// Response body that did not contain extractable text
    Raw(serde_json::Value),
}

impl SendOutcome {
    /// Extract the anonymized text from a webhook response body
    ///
    /// Objects are visited in the order the service sent them.
    pub fn from_response(body: serde_json::Value) -> Self {
        match first_object_text(&body) {
            Some(text) => Self::Anonymized(text.to_string()),
            None => Self::Raw(body),
        }
    }

    pub fn is_anonymized(&self) -> bool {
        matches!(self, Self::Anonymized(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Anonymized(text) => Some(text),
            Self::Raw(_) => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Anonymized(text) => Some(text),
            Self::Raw(_) => None,
        }
    }
}

fn first_object_text(body: &serde_json::Value) -> Option<&str> {
    body.get("data")?
        .get("objects")?
        .as_object()?
        .values()
        .next()?
        .get("text")?
        .as_array()?
        .first()?
        .as_str()
}
