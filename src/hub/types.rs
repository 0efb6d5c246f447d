//! Request and response types of the hub API.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::access::Visibility;
use crate::storage::{
    BlobId, BranchName, InvalidNameError, ObjectMeta, ObjectPath, RefSpec, RepoName, UserName,
};

/// `owner/name` address of a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoPath {
    pub owner: UserName,
    pub name: RepoName,
}

impl RepoPath {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, InvalidNameError> {
        Ok(Self {
            owner: UserName::new(owner)?,
            name: RepoName::new(name)?,
        })
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoPath {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, name) = s
            .split_once('/')
            .ok_or_else(|| InvalidNameError::InvalidPath(s.to_string()))?;
        Self::new(owner, name)
    }
}

/// a readable point of a repository: a committed ref or a branch's WIP
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "value")]
pub enum Revision {
    Ref(RefSpec),
    /// a bare name resolved as branch, tag or commit hash
    Name(String),
    /// the working tree of a branch's WIP
    Wip(BranchName),
}

impl Revision {
    pub fn branch(name: BranchName) -> Self {
        Revision::Ref(RefSpec::Branch(name))
    }

    pub fn name(name: impl Into<String>) -> Self {
        Revision::Name(name.into())
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Ref(spec) => write!(f, "{}", spec),
            Revision::Name(name) => f.write_str(name),
            Revision::Wip(branch) => write!(f, "wip of {}", branch),
        }
    }
}

/// descriptor of a stored object at a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub path: ObjectPath,
    pub hash: BlobId,
    pub size: u64,
    pub checksum: String,
    pub etag: String,
}

impl ObjectInfo {
    pub(crate) fn new(path: ObjectPath, meta: ObjectMeta) -> Self {
        Self {
            path,
            checksum: meta.checksum(),
            etag: meta.id.etag(),
            hash: meta.id,
            size: meta.size,
        }
    }
}

/// an object's descriptor and bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectContent {
    pub info: ObjectInfo,
    pub bytes: Vec<u8>,
}

/// options for a new repository
#[derive(Debug, Clone, Default)]
pub struct CreateRepository {
    pub description: Option<String>,
    pub visibility: Visibility,
}

/// changes to a repository's settings; `None` leaves a field as is
#[derive(Debug, Clone, Default)]
pub struct UpdateRepository {
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
    /// new default branch; must exist
    pub head: Option<BranchName>,
}

/// changes to a merge request; `None` leaves a field as is
#[derive(Debug, Clone, Default)]
pub struct UpdateMergeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    /// `true` closes an open request, `false` reopens a closed one
    pub closed: Option<bool>,
}
