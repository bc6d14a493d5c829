//! Error types for flow lookup and invocation

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised before a flow starts running.
///
/// Failures inside a running flow never surface here: the manager logs them
/// and the flow yields no result.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("flow '{name}' not found{}", .suggestion.as_ref().map(|s| format!(", did you mean '{}'?", s)).unwrap_or_default())]
    NotFound {
        name: String,
        suggestion: Option<String>,
    },

    #[error("malformed flow name '{name}': {reason}")]
    MalformedName { name: String, reason: String },

    #[error("no 'flow' parameter given")]
    MissingFlow,

    #[error("failed to read flow data {}: {source}", .path.display())]
    FlowDataRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse flow data {}: {source}", .path.display())]
    FlowDataParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("flow data {} must contain a JSON object", .path.display())]
    FlowDataNotObject { path: PathBuf },

    #[error("flow data indirection nested too deeply at {}", .path.display())]
    FlowDataTooDeep { path: PathBuf },
}

impl FlowError {
    /// Returns true if the flow name could not be resolved
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            FlowError::NotFound { .. } | FlowError::MalformedName { .. } | FlowError::MissingFlow
        )
    }

    pub fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedName {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
