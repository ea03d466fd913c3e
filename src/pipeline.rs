//! Pipeline definition document
//!
//! The definition is an opaque JSON graph (`components`, `source`, ...) that
//! is sent to the service unmodified. The read-only views here exist for
//! logging and the `pipeline` CLI command; nothing in this crate edits the
//! document.

use crate::error::{DtcError, Result};
use std::path::Path;

/// Definition shipped with the crate: webhook source → classify →
/// anonymize_text → response.
const EMBEDDED_DEFINITION: &str = include_str!("../assets/pipeline.json");

/// A pipeline definition as accepted by `/pipe/validate` and `/task`
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDefinition {
    document: serde_json::Value,
}

/// One component of the definition graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRef<'a> {
    pub id: &'a str,
    pub provider: &'a str,
    /// `(lane, from)` pairs feeding this component
    pub inputs: Vec<(&'a str, &'a str)>,
}

impl PipelineDefinition {
    /// The definition bundled with this crate
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_DEFINITION)
    }

    /// Parse a definition from JSON text
    ///
    /// Accepts either the bare definition or one wrapped in a top-level
    /// `pipeline` key, as exported by the pipeline designer.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| DtcError::Pipeline(format!("invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Load a definition from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DtcError::Pipeline(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Wrap an already-parsed definition
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let document = match value {
            serde_json::Value::Object(mut map) if map.contains_key("pipeline") => {
                map.remove("pipeline").unwrap_or_default()
            }
            other => other,
        };

        if !document.is_object() {
            return Err(DtcError::Pipeline(
                "definition must be a JSON object".to_string(),
            ));
        }

        Ok(Self { document })
    }

    /// The definition exactly as it is sent to the service
    pub fn as_value(&self) -> &serde_json::Value {
        &self.document
    }

    /// Body of the launch call: `{ "pipeline": <definition> }`
    pub fn launch_body(&self) -> serde_json::Value {
        serde_json::json!({ "pipeline": self.document })
    }

    /// Components in document order; entries without an `id` are skipped
    pub fn components(&self) -> Vec<ComponentRef<'_>> {
        let Some(items) = self.document.get("components").and_then(|c| c.as_array()) else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|c| {
                let id = c.get("id")?.as_str()?;
                let provider = c.get("provider").and_then(|p| p.as_str()).unwrap_or("");
                let inputs = c
                    .get("input")
                    .and_then(|i| i.as_array())
                    .map(|lanes| {
                        lanes
                            .iter()
                            .filter_map(|l| {
                                Some((l.get("lane")?.as_str()?, l.get("from")?.as_str()?))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Some(ComponentRef {
                    id,
                    provider,
                    inputs,
                })
            })
            .collect()
    }

    /// Id of the ingestion component
    ///
    /// Uses the document's `source` field, else the first webhook component.
    pub fn source_component(&self) -> Option<&str> {
        if let Some(source) = self.document.get("source").and_then(|s| s.as_str()) {
            return Some(source);
        }
        self.components()
            .into_iter()
            .find(|c| c.provider == "webhook")
            .map(|c| c.id)
    }
}
