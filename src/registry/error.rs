//! Registry error types

use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("user already exists: {0}")]
    UserExists(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("repository already exists: {0}")]
    RepositoryExists(String),

    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("{user} is already a member of {repo}")]
    MemberExists { repo: String, user: String },

    #[error("{user} is not a member of {repo}")]
    MemberNotFound { repo: String, user: String },

    #[error("merge request not found: {0}")]
    MergeRequestNotFound(u64),

    #[error("merge request {0} is already merged")]
    MergeRequestMerged(u64),

    #[error(
        "an open merge request from {source_branch} into {target_branch} already exists (#{seq})"
    )]
    MergeRequestExists {
        source_branch: String,
        target_branch: String,
        seq: u64,
    },
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Io(_) | RegistryError::Serialization(_) => ErrorKind::StorageUnavailable,
            RegistryError::MergeRequestMerged(_) => ErrorKind::BadRequest,
            RegistryError::UserExists(_)
            | RegistryError::RepositoryExists(_)
            | RegistryError::MemberExists { .. }
            | RegistryError::MergeRequestExists { .. } => ErrorKind::Conflict,
            RegistryError::UserNotFound(_)
            | RegistryError::RepositoryNotFound(_)
            | RegistryError::MemberNotFound { .. }
            | RegistryError::MergeRequestNotFound(_) => ErrorKind::NotFound,
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
