//! Engine error taxonomy
//!
//! Every fallible engine operation returns one of four kinds. Callers decide
//! recovery by kind: transient network trouble is skipped, storage trouble aborts
//! the in-flight operation, configuration trouble is surfaced to the operator and
//! a missing device rejects the requested transition.

use thiserror::Error;

/// Result alias used across the engine
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Discovery, profiler or channel I/O failed; never fatal to a cycle
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Persistence layer unavailable or a statement failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Nothing configured, or a setting holds an invalid value
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A transition was requested for a MAC (or alert id) outside the expected source set
    #[error("{subject} not found in {expected}")]
    NotFound { subject: String, expected: String },
}

impl EngineError {
    pub fn storage(message: impl Into<String>) -> Self {
        EngineError::Storage(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        EngineError::TransientNetwork(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Configuration(message.into())
    }

    pub fn device_not_found(mac: impl std::fmt::Display, expected: impl std::fmt::Display) -> Self {
        EngineError::NotFound {
            subject: format!("device {}", mac),
            expected: expected.to_string(),
        }
    }

    pub fn alert_not_found(id: i64) -> Self {
        EngineError::NotFound {
            subject: format!("alert #{}", id),
            expected: "alerts".to_string(),
        }
    }

    /// Stable label for logs and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::TransientNetwork(_) => "TRANSIENT_NETWORK",
            EngineError::Storage(_) => "STORAGE",
            EngineError::Configuration(_) => "CONFIGURATION",
            EngineError::NotFound { .. } => "NOT_FOUND",
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}
