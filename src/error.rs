//! The caller-facing failure taxonomy.
//!
//! Every error in this crate classifies into exactly one [`ErrorKind`], so
//! collaborators (an HTTP layer, a CLI) can map failures to status codes
//! without inspecting individual variants.

use std::fmt;

use serde::{Deserialize, Serialize};

/// classification of a failure as seen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// owner, repository, ref, path, tag or WIP absent
    NotFound,
    /// missing or insufficient authentication/capability
    Unauthorized,
    /// authenticated but categorically disallowed
    Forbidden,
    /// malformed input
    BadRequest,
    /// duplicate creation or a lost compare-and-swap race
    Conflict,
    /// the underlying store failed
    StorageUnavailable,
    /// the caller cancelled a long-running read
    Cancelled,
}

impl ErrorKind {
    /// the conventional HTTP status for this kind
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::BadRequest => 400,
            ErrorKind::Conflict => 409,
            ErrorKind::StorageUnavailable => 503,
            ErrorKind::Cancelled => 499,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::BadRequest => "bad request",
            ErrorKind::Conflict => "conflict",
            ErrorKind::StorageUnavailable => "storage unavailable",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
