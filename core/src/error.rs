//! Error types for globstate

use thiserror::Error;

/// Main error type for globstate
///
/// Cloneable so one failure can be reported to `on_error`, recorded in the
/// store metadata, and returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    // ============ Adapter Errors ============
    #[error("Persistor read failed for {key}: {reason}")]
    ReadFailed { key: String, reason: String },
    
    #[error("Persistor write failed for {key}: {reason}")]
    WriteFailed { key: String, reason: String },
    
    #[error("Storage error: {0}")]
    Storage(String),
    
    // ============ Codec Errors ============
    #[error("Value serialization failed: {0}")]
    Serialization(String),
    
    #[error("Value deserialization failed: {0}")]
    Deserialization(String),
    
    // ============ Store Errors ============
    #[error("Type mismatch for key {key}: expected {expected}")]
    TypeMismatch { key: String, expected: &'static str },
    
    #[error("Updater failed: {0}")]
    Updater(String),
    
    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    Config(String),
    
    // ============ General Errors ============
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StateError {
    pub fn read_failed(key: impl ToString, reason: impl ToString) -> Self {
        StateError::ReadFailed {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
    
    pub fn write_failed(key: impl ToString, reason: impl ToString) -> Self {
        StateError::WriteFailed {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for StateError {
    fn from(err: std::io::Error) -> Self {
        StateError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}
