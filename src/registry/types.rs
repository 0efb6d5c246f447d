//! Registry records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::{Group, Visibility};
use crate::storage::{BranchName, CommitId, RepoName, UserName};

/// a known user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: UserName,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// a data repository's metadata; its content lives in the bare git repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// ULID; differs between a deleted repository and its re-creation
    pub id: String,
    pub owner: UserName,
    pub name: RepoName,
    pub description: Option<String>,
    pub visibility: Visibility,
    /// default branch
    pub head: BranchName,
    pub creator: UserName,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RepositoryRecord {
    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// a user granted access to a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user: UserName,
    pub group: Group,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeRequestState {
    Open,
    Merged,
    Closed,
}

/// a proposal to merge one branch into another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    /// sequence number, unique within the repository, starting at 1
    pub seq: u64,
    pub source: BranchName,
    pub target: BranchName,
    pub title: String,
    pub description: Option<String>,
    pub state: MergeRequestState,
    pub author: UserName,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// set once merged
    pub merge_commit: Option<CommitId>,
}

/// fields for a new merge request
#[derive(Debug, Clone)]
pub struct NewMergeRequest {
    pub source: BranchName,
    pub target: BranchName,
    pub title: String,
    pub description: Option<String>,
    pub author: UserName,
}
