//! Error types for the pipeline orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Orchestrator errors
#[derive(Debug, Error)]
pub enum Error {
    /// Missing collaborator or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another run is active for the same document
    #[error("Pipeline busy: document '{document_id}' in index '{index}' is being processed")]
    PipelineBusy { index: String, document_id: String },

    /// No handler registered for a step
    #[error("Unknown pipeline step: {0}")]
    UnknownStep(String),

    /// A handler reported a failure
    #[error("Step '{step}' failed: {message}")]
    StepExecution { step: String, message: String },

    /// Malformed input, rejected before any state mutation
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation was cancelled by the caller or by shutdown
    #[error("Operation cancelled")]
    Cancelled,

    /// A pipeline write raced with another writer
    #[error("Stale write for '{key}': expected version {expected:?}, found {found:?}")]
    VersionConflict {
        key: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    /// Pipeline or content storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a busy error for a document
    pub fn busy(index: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self::PipelineBusy {
            index: index.into(),
            document_id: document_id.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the caller may retry the same call later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PipelineBusy { .. } | Self::VersionConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::busy("kb", "doc1").is_retryable());
        assert!(Error::VersionConflict {
            key: "kb/doc1".to_string(),
            expected: Some(1),
            found: Some(2),
        }
        .is_retryable());
        assert!(!Error::validation("bad index").is_retryable());
        assert!(!Error::UnknownStep("extract".to_string()).is_retryable());
    }

    #[test]
    fn test_busy_message_names_document() {
        let msg = Error::busy("kb", "doc1").to_string();
        assert!(msg.contains("doc1"));
        assert!(msg.contains("kb"));
    }
}
