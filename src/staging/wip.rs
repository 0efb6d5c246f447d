//! Work-in-progress state.
//!
//! A WIP lives entirely in git: `refs/wip/<branch>` points at a snapshot
//! commit whose tree is the working tree and whose only parent is the base
//! commit. The snapshot message carries the WIP's metadata as JSON. Every
//! mutation writes a new snapshot and swaps the ref, so a WIP is never seen
//! half-updated.

use chrono::{DateTime, TimeZone, Utc};
use git2::Repository;
use serde::{Deserialize, Serialize};

use crate::storage::commit::{get_commit, CommitBuilder};
use crate::storage::{
    BranchName, CommitId, RefManager, Signature, StorageError, StorageResult, TreeId,
};

/// whether `open` made a new WIP or found one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WipStatus {
    Created,
    Existing,
}

/// the staging area of one branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wip {
    pub branch: BranchName,
    /// branch head when the WIP was opened
    pub base: CommitId,
    /// root of the working tree
    pub tree: TreeId,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) snapshot: CommitId,
}

/// metadata stored in the snapshot commit message
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WipMeta {
    creator: String,
    created_at: DateTime<Utc>,
}

impl Wip {
    /// load the WIP of `branch`, if any
    pub(crate) fn load(repo: &Repository, branch: &BranchName) -> StorageResult<Option<Self>> {
        match RefManager::read_ref(repo, &branch.wip_ref_path())? {
            Some(snapshot) => Self::from_snapshot(repo, branch.clone(), snapshot).map(Some),
            None => Ok(None),
        }
    }

    /// like `load`, but absence is `WipNotFound`
    pub(crate) fn require(repo: &Repository, branch: &BranchName) -> StorageResult<Self> {
        Self::load(repo, branch)?.ok_or_else(|| StorageError::WipNotFound(branch.to_string()))
    }

    fn from_snapshot(
        repo: &Repository,
        branch: BranchName,
        snapshot: CommitId,
    ) -> StorageResult<Self> {
        let info = get_commit(repo, snapshot)?;
        let corrupted = |reason: String| StorageError::CorruptedData {
            path: branch.wip_ref_path(),
            reason,
        };

        let base = info
            .first_parent()
            .ok_or_else(|| corrupted("snapshot has no base commit".to_string()))?;
        let meta: WipMeta =
            serde_json::from_str(&info.message).map_err(|e| corrupted(e.to_string()))?;

        Ok(Self {
            branch,
            base,
            tree: info.tree_id,
            creator: meta.creator,
            created_at: meta.created_at,
            updated_at: info.timestamp,
            snapshot,
        })
    }

    /// write a snapshot of `tree` on top of `base`
    pub(crate) fn write_snapshot(
        repo: &Repository,
        base: CommitId,
        tree: TreeId,
        creator: &str,
        created_at: DateTime<Utc>,
    ) -> StorageResult<CommitId> {
        let meta = WipMeta {
            creator: creator.to_string(),
            created_at,
        };
        let message =
            serde_json::to_string(&meta).map_err(|e| StorageError::Internal(e.to_string()))?;

        CommitBuilder::new(repo)
            .tree(tree)
            .parent(base)
            .message(message)
            .signature(Signature::system())
            .commit()
    }

    /// replace the working tree, keeping base and metadata
    pub(crate) fn update_tree(&self, repo: &Repository, tree: TreeId) -> StorageResult<Self> {
        if tree == self.tree {
            return Ok(self.clone());
        }
        let snapshot = Self::write_snapshot(repo, self.base, tree, &self.creator, self.created_at)?;
        let wip_ref = self.branch.wip_ref_path();
        RefManager::swap_ref(repo, &wip_ref, self.snapshot, snapshot, "wip: update")?;
        Self::from_snapshot(repo, self.branch.clone(), snapshot)
    }
}

/// creation time with sub-second precision dropped, matching commit times
pub(crate) fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(Utc::now().timestamp(), 0).single().unwrap_or_else(Utc::now)
}
