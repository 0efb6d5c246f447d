//! Storage layer error types
//!
//! All errors that can occur during storage operations are defined here
//! We use `thiserror` for ergonomic error definition and better error messages

use std::path::PathBuf;

use thiserror::Error;

use crate::error::ErrorKind;
use crate::storage::types::InvalidNameError;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// no object with this hash exists in the store
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// a path segment did not resolve
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// a listing was requested for a path that is not a directory
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// writing the path would replace a file with a directory or vice versa
    #[error("path conflict at {path}: {reason}")]
    PathConflict { path: String, reason: String },

    /// the specified branch/tag/ref was not found
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// the commit was not found
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// no work-in-progress exists for the branch
    #[error("no wip for branch {0}")]
    WipNotFound(String),

    /// invalid branch, tag, repository or path name
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// branch already exists
    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    /// tag already exists
    #[error("tag already exists: {0}")]
    TagAlreadyExists(String),

    /// branch update failed due to concurrent modification
    #[error("concurrent modification: ref {branch} was updated by another writer")]
    ConcurrentModification { branch: String },

    /// paths changed on both sides of a merge
    #[error("merge conflict: {conflicting_paths:?}")]
    MergeConflict { conflicting_paths: Vec<String> },

    /// the merge request makes no sense (e.g. a branch into itself)
    #[error("invalid merge: {0}")]
    InvalidMerge(String),

    /// the branch cannot be removed
    #[error("cannot delete default branch {0}")]
    DefaultBranch(String),

    /// the caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// repo is not initialized
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// data integrity check failed
    #[error("corrupted data at {path}: {reason}")]
    CorruptedData { path: String, reason: String },

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// the caller-facing classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::ObjectNotFound(_)
            | StorageError::PathNotFound(_)
            | StorageError::NotADirectory(_)
            | StorageError::RefNotFound(_)
            | StorageError::CommitNotFound(_)
            | StorageError::WipNotFound(_) => ErrorKind::NotFound,
            StorageError::InvalidName(_)
            | StorageError::PathConflict { .. }
            | StorageError::InvalidMerge(_)
            | StorageError::DefaultBranch(_) => ErrorKind::BadRequest,
            StorageError::BranchAlreadyExists(_)
            | StorageError::TagAlreadyExists(_)
            | StorageError::ConcurrentModification { .. }
            | StorageError::MergeConflict { .. } => ErrorKind::Conflict,
            StorageError::Cancelled => ErrorKind::Cancelled,
            StorageError::Git(_)
            | StorageError::Io(_)
            | StorageError::NotInitialized(_)
            | StorageError::CorruptedData { .. }
            | StorageError::Internal(_) => ErrorKind::StorageUnavailable,
        }
    }

    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// check if this error is recoverable by retry
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::ConcurrentModification { .. })
    }

    /// map a git "not found" into the given error, everything else stays a git error
    pub(crate) fn or_not_found(err: git2::Error, not_found: impl FnOnce() -> StorageError) -> Self {
        if err.code() == git2::ErrorCode::NotFound {
            not_found()
        } else {
            StorageError::Git(err)
        }
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
