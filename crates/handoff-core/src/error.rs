//! Error types shared by every storage backend

use crate::types::SaveInput;
use thiserror::Error;

/// Errors returned by [`HandoffStore`](crate::HandoffStore) operations
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Input rejected by a limit, format rule or conflict
    #[error("{0}")]
    Validation(String),

    /// Requested handoff does not exist
    #[error("{0}")]
    NotFound(String),

    /// The shared server could not be reached within the reconnect budget
    #[error("{message}")]
    Connectivity {
        message: String,
        suggestion: String,
        /// The payload of a save that never reached the server
        pending: Option<Box<SaveInput>>,
    },

    /// The server answered with something that is not the expected JSON
    #[error("Could not parse server response: {0}")]
    Protocol(String),

    /// The server answered with an unexpected non-success status
    #[error("Server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(key: &str) -> Self {
        Self::NotFound(format!("Handoff not found: {}", key))
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// Unsent save payload carried by a connectivity failure
    pub fn pending_save(&self) -> Option<&SaveInput> {
        match self {
            Self::Connectivity { pending, .. } => pending.as_deref(),
            _ => None,
        }
    }

    /// Recovery hint for connectivity failures
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connectivity { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}
