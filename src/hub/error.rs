//! Hub error types

use thiserror::Error;

use crate::access::AccessError;
use crate::error::ErrorKind;
use crate::registry::RegistryError;
use crate::storage::{InvalidNameError, StorageError};

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("access denied: {0}")]
    Access(#[from] AccessError),

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// deliberately vague: owner and repository absence look the same
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HubError {
    /// the caller-facing classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            HubError::Storage(e) => e.kind(),
            HubError::Registry(e) => e.kind(),
            HubError::Access(e) => e.kind(),
            HubError::InvalidName(_) | HubError::BadRequest(_) => ErrorKind::BadRequest,
            HubError::NotFound(_) => ErrorKind::NotFound,
            HubError::InvalidConfig(_) | HubError::Io(_) => ErrorKind::StorageUnavailable,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}
