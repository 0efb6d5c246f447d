//!  Branch, tag and reference management.
//!
//!  Git refs are pointers to commits. This module handles:
//! - Branch lifecycle (create, compare-and-swap update, delete)
//! - Immutable annotated tags
//! - Work-in-progress refs (`refs/wip/{branch}`)
//! - Ref resolution from a typed [`RefSpec`] or a bare name
//!
//! Every ref is its own cell: updates name the value they expect to replace,
//! so a writer holding a stale view fails instead of overwriting newer history.

use chrono::{DateTime, TimeZone, Utc};
use git2::{ErrorCode, ObjectType, Repository};
use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BranchName, CommitId, Signature, TagName};

/// A typed reference to a point in history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum RefSpec {
    Branch(BranchName),
    Tag(TagName),
    Commit(CommitId),
}

impl std::fmt::Display for RefSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefSpec::Branch(b) => write!(f, "branch {}", b),
            RefSpec::Tag(t) => write!(f, "tag {}", t),
            RefSpec::Commit(c) => write!(f, "commit {}", c),
        }
    }
}

/// a branch and its head
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    pub name: BranchName,
    pub commit: CommitId,
}

/// a tag and the commit it pins
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagInfo {
    pub name: TagName,
    pub target: CommitId,
    pub message: String,
    pub tagger: Option<Signature>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Manages Git references.
pub struct RefManager;

impl RefManager {
    // ==================== Resolution ====================

    /// Resolve a typed ref to the commit it points at.
    pub fn resolve(repo: &Repository, spec: &RefSpec) -> StorageResult<CommitId> {
        match spec {
            RefSpec::Branch(branch) => Self::resolve_branch(repo, branch),
            RefSpec::Tag(tag) => Self::resolve_tag(repo, tag),
            RefSpec::Commit(id) => {
                let missing = || StorageError::CommitNotFound(id.to_string());
                repo.find_commit(id.raw())
                    .map_err(|e| StorageError::or_not_found(e, missing))?;
                Ok(*id)
            }
        }
    }

    /// Resolve a bare name that may be a branch, a tag or a full commit hash.
    ///
    /// A name matching more than one kind is ambiguous and reported as not found.
    pub fn resolve_name(repo: &Repository, name: &str) -> StorageResult<CommitId> {
        let mut candidates = Vec::with_capacity(3);

        if let Ok(branch) = BranchName::new(name) {
            if Self::branch_exists(repo, &branch) {
                candidates.push(RefSpec::Branch(branch));
            }
        }
        if let Ok(tag) = TagName::new(name) {
            if Self::tag_exists(repo, &tag) {
                candidates.push(RefSpec::Tag(tag));
            }
        }
        if let Ok(id) = CommitId::from_hex(name) {
            if repo.find_commit(id.raw()).is_ok() {
                candidates.push(RefSpec::Commit(id));
            }
        }

        match candidates.as_slice() {
            [only] => Self::resolve(repo, only),
            _ => Err(StorageError::RefNotFound(name.to_string())),
        }
    }

    // ==================== Branches ====================

    /// Resolve a branch name to its current commit ID.
    pub fn resolve_branch(repo: &Repository, branch: &BranchName) -> StorageResult<CommitId> {
        let reference = repo
            .find_reference(&branch.as_ref_path())
            .map_err(|e| {
                StorageError::or_not_found(e, || StorageError::RefNotFound(branch.to_string()))
            })?;

        let commit = reference
            .peel_to_commit()
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        Ok(CommitId::new(commit.id()))
    }

    /// Check if a branch exists.
    pub fn branch_exists(repo: &Repository, branch: &BranchName) -> bool {
        repo.find_reference(&branch.as_ref_path()).is_ok()
    }

    /// Create a new branch pointing to the given commit.
    pub fn create_branch(
        repo: &Repository,
        branch: &BranchName,
        target: CommitId,
    ) -> StorageResult<()> {
        let missing = || StorageError::CommitNotFound(target.to_string());
        repo.find_commit(target.raw())
            .map_err(|e| StorageError::or_not_found(e, missing))?;

        let log = format!("branch: created at {}", target.short());
        repo.reference(&branch.as_ref_path(), target.raw(), false, &log)
            .map_err(|e| match e.code() {
                ErrorCode::Exists => StorageError::BranchAlreadyExists(branch.to_string()),
                _ => StorageError::Git(e),
            })?;

        Ok(())
    }

    /// Update a branch only if it still points to the expected commit.
    ///
    /// This provides compare-and-swap semantics for safe concurrent updates.
    /// Returns error if the branch was modified by another writer.
    pub fn update_branch_if_unchanged(
        repo: &Repository,
        branch: &BranchName,
        expected: CommitId,
        new_target: CommitId,
    ) -> StorageResult<()> {
        let missing = || StorageError::CommitNotFound(new_target.to_string());
        repo.find_commit(new_target.raw())
            .map_err(|e| StorageError::or_not_found(e, missing))?;

        let current = Self::resolve_branch(repo, branch)?;
        if current != expected {
            return Err(StorageError::ConcurrentModification {
                branch: branch.to_string(),
            });
        }

        Self::swap_ref(
            repo,
            &branch.as_ref_path(),
            expected,
            new_target,
            &format!("update branch to {}", new_target.short()),
        )
    }

    /// Delete a branch and its WIP ref, if any, in one ref transaction.
    pub fn delete_branch(repo: &Repository, branch: &BranchName) -> StorageResult<()> {
        let branch_ref = branch.as_ref_path();
        let wip_ref = branch.wip_ref_path();
        let mut tx = repo.transaction()?;
        tx.lock_ref(&branch_ref).map_err(|e| Self::map_race(e, &branch_ref))?;
        tx.lock_ref(&wip_ref).map_err(|e| Self::map_race(e, &wip_ref))?;

        if Self::read_ref(repo, &branch_ref)?.is_none() {
            return Err(StorageError::RefNotFound(branch.to_string()));
        }
        tx.remove(&branch_ref)?;
        if Self::read_ref(repo, &wip_ref)?.is_some() {
            tx.remove(&wip_ref)?;
        }
        tx.commit().map_err(|e| Self::map_race(e, &branch_ref))?;
        Ok(())
    }

    /// List all branches, sorted by name.
    pub fn list_branches(repo: &Repository) -> StorageResult<Vec<BranchInfo>> {
        let mut result = Vec::new();
        for reference in repo.references_glob("refs/heads/*")? {
            let reference = reference?;
            let Some(name) = reference.shorthand() else { continue };
            let Ok(name) = BranchName::new(name) else { continue };
            let commit = reference.peel_to_commit()?;
            result.push(BranchInfo {
                name,
                commit: CommitId::new(commit.id()),
            });
        }
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    /// Point HEAD at a branch (the repository's default branch).
    pub fn set_default_branch(repo: &Repository, branch: &BranchName) -> StorageResult<()> {
        if !Self::branch_exists(repo, branch) {
            return Err(StorageError::RefNotFound(branch.to_string()));
        }
        repo.set_head(&branch.as_ref_path())?;
        Ok(())
    }

    // ==================== Tags ====================

    /// Check if a tag exists.
    pub fn tag_exists(repo: &Repository, tag: &TagName) -> bool {
        repo.find_reference(&tag.as_ref_path()).is_ok()
    }

    /// Create an annotated tag. Tags are never moved once created.
    pub fn create_tag(
        repo: &Repository,
        tag: &TagName,
        target: CommitId,
        message: &str,
        tagger: &Signature,
    ) -> StorageResult<TagInfo> {
        let object = repo
            .find_object(target.raw(), Some(ObjectType::Commit))
            .map_err(|e| {
                StorageError::or_not_found(e, || StorageError::CommitNotFound(target.to_string()))
            })?;
        let sig = tagger.to_git2_signature()?;

        repo.tag(tag.as_str(), &object, &sig, message, false).map_err(|e| match e.code() {
            ErrorCode::Exists => StorageError::TagAlreadyExists(tag.to_string()),
            _ => StorageError::Git(e),
        })?;

        Self::get_tag(repo, tag)
    }

    /// Resolve a tag to the commit it points at.
    pub fn resolve_tag(repo: &Repository, tag: &TagName) -> StorageResult<CommitId> {
        Ok(Self::get_tag(repo, tag)?.target)
    }

    /// Read a tag with its annotation.
    pub fn get_tag(repo: &Repository, tag: &TagName) -> StorageResult<TagInfo> {
        let reference = repo
            .find_reference(&tag.as_ref_path())
            .map_err(|e| {
                StorageError::or_not_found(e, || StorageError::RefNotFound(tag.to_string()))
            })?;

        let commit = reference
            .peel_to_commit()
            .map_err(|_| StorageError::RefNotFound(tag.to_string()))?;

        // lightweight tags (created outside this crate) carry no annotation
        let annotation = reference.peel(ObjectType::Tag).ok().and_then(|o| o.into_tag().ok());
        let (message, tagger, created_at) = match annotation {
            Some(annotated) => {
                let tagger = annotated.tagger().map(|sig| {
                    let name = sig.name().unwrap_or("Unknown");
                    Signature::new(name, sig.email().unwrap_or("unknown@unknown"))
                });
                let created_at = annotated
                    .tagger()
                    .and_then(|sig| Utc.timestamp_opt(sig.when().seconds(), 0).single());
                (annotated.message().unwrap_or("").to_string(), tagger, created_at)
            }
            None => (String::new(), None, None),
        };

        Ok(TagInfo {
            name: tag.clone(),
            target: CommitId::new(commit.id()),
            message,
            tagger,
            created_at,
        })
    }

    /// Delete a tag. The tagged commit is not touched.
    pub fn delete_tag(repo: &Repository, tag: &TagName) -> StorageResult<()> {
        let mut reference = repo
            .find_reference(&tag.as_ref_path())
            .map_err(|e| {
                StorageError::or_not_found(e, || StorageError::RefNotFound(tag.to_string()))
            })?;
        reference.delete()?;
        Ok(())
    }

    /// List all tags, sorted by name.
    pub fn list_tags(repo: &Repository) -> StorageResult<Vec<TagInfo>> {
        let mut tags = Vec::new();
        for name in repo.tag_names(None)?.iter().flatten() {
            if let Ok(tag) = TagName::new(name) {
                tags.push(Self::get_tag(repo, &tag)?);
            }
        }
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    // ==================== Raw ref cells ====================

    /// Read a ref's target, `None` if absent.
    pub fn read_ref(repo: &Repository, refname: &str) -> StorageResult<Option<CommitId>> {
        match repo.refname_to_id(refname) {
            Ok(oid) => Ok(Some(CommitId::new(oid))),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(StorageError::Git(e)),
        }
    }

    /// Create a ref unless it already exists.
    ///
    /// Returns `false` when another writer created it first; the existing
    /// value is left untouched.
    pub fn create_ref_if_absent(
        repo: &Repository,
        refname: &str,
        target: CommitId,
        log: &str,
    ) -> StorageResult<bool> {
        match repo.reference(refname, target.raw(), false, log) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::Exists => Ok(false),
            Err(e) => Err(StorageError::Git(e)),
        }
    }

    /// Move a ref from `expected` to `new_target`, failing if it moved meanwhile.
    pub fn swap_ref(
        repo: &Repository,
        refname: &str,
        expected: CommitId,
        new_target: CommitId,
        log: &str,
    ) -> StorageResult<()> {
        repo.reference_matching(refname, new_target.raw(), true, expected.raw(), log)
            .map_err(|e| Self::map_race(e, refname))?;
        Ok(())
    }

    /// Delete a ref only if it still has the expected value.
    pub fn delete_ref_if(
        repo: &Repository,
        refname: &str,
        expected: CommitId,
    ) -> StorageResult<()> {
        let mut tx = repo.transaction()?;
        tx.lock_ref(refname).map_err(|e| Self::map_race(e, refname))?;
        match Self::read_ref(repo, refname)? {
            Some(current) if current == expected => {}
            _ => {
                return Err(StorageError::ConcurrentModification {
                    branch: refname.to_string(),
                })
            }
        }
        tx.remove(refname)?;
        tx.commit().map_err(|e| Self::map_race(e, refname))?;
        Ok(())
    }

    /// Atomically advance a branch and drop a companion ref (a branch's WIP).
    ///
    /// Both refs are locked first; if either no longer holds the expected
    /// value nothing is written.
    pub fn advance_and_remove(
        repo: &Repository,
        branch: &BranchName,
        expected_head: CommitId,
        new_head: CommitId,
        companion: &str,
        expected_companion: CommitId,
        log: &str,
    ) -> StorageResult<()> {
        let branch_ref = branch.as_ref_path();
        let mut tx = repo.transaction()?;
        tx.lock_ref(&branch_ref).map_err(|e| Self::map_race(e, &branch_ref))?;
        tx.lock_ref(companion).map_err(|e| Self::map_race(e, companion))?;

        if Self::read_ref(repo, &branch_ref)? != Some(expected_head) {
            return Err(StorageError::ConcurrentModification {
                branch: branch.to_string(),
            });
        }
        if Self::read_ref(repo, companion)? != Some(expected_companion) {
            return Err(StorageError::ConcurrentModification {
                branch: companion.to_string(),
            });
        }

        tx.set_target(&branch_ref, new_head.raw(), None, log)?;
        tx.remove(companion)?;
        tx.commit().map_err(|e| Self::map_race(e, &branch_ref))?;
        Ok(())
    }

    /// All refs under a prefix glob with their targets.
    pub fn list_refs(repo: &Repository, glob: &str) -> StorageResult<Vec<(String, CommitId)>> {
        let mut refs = Vec::new();
        for reference in repo.references_glob(glob)? {
            let reference = reference?;
            if let (Some(name), Some(target)) = (reference.name(), reference.target()) {
                refs.push((name.to_string(), CommitId::new(target)));
            }
        }
        refs.sort();
        Ok(refs)
    }

    fn map_race(e: git2::Error, refname: &str) -> StorageError {
        match e.code() {
            ErrorCode::Modified | ErrorCode::Locked | ErrorCode::Exists => {
                tracing::warn!(refname, error = %e, "ref update lost a race");
                StorageError::ConcurrentModification {
                    branch: refname.to_string(),
                }
            }
            ErrorCode::NotFound => StorageError::RefNotFound(refname.to_string()),
            _ => StorageError::Git(e),
        }
    }
}
