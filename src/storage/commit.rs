//!  Commit creation and history traversal
//!
//!  commits are immutable, hash-addressed nodes of the history graph. Each
//!  one names a root tree and zero or more parents; the committer and
//!  timestamp are part of the hashed content, so two commits of the same tree
//!  still get distinct ids.
//!
//! this module handles commit creation, paginated history walking and
//! ancestry queries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use git2::{Repository, Revwalk, Sort};
use serde::Serialize;

use crate::storage::cancel::CancelToken;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::tree;
use crate::storage::types::{CommitId, InvalidNameError, Signature, TreeId};

/// information about a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub id: CommitId,
    pub tree_id: TreeId,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub committer: Signature,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let committer = commit.committer();
        let time = commit.time();
        let timestamp = Utc.timestamp_opt(time.seconds(), 0).single().unwrap_or_else(Utc::now);

        Self {
            id: CommitId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            committer: Signature::new(
                committer.name().unwrap_or("Unknown"),
                committer.email().unwrap_or("unknown@unknown"),
            ),
            timestamp,
        }
    }

    /// check if this is a merge commit (has multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }

    /// get the first (or only) parent
    pub fn first_parent(&self) -> Option<CommitId> {
        self.parent_ids.first().copied()
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<TreeId>,
    parents: Vec<CommitId>,
    message: String,
    signature: Signature,
    update_ref: Option<String>,
}

impl<'a> CommitBuilder<'a> {
    /// create a new CommitBuilder
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            signature: Signature::system(),
            update_ref: None,
        }
    }

    /// set the tree for this commit
    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// add a parent commit
    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    /// set multiple parents (for merge commits)
    pub fn parents(mut self, parents: Vec<CommitId>) -> Self {
        self.parents = parents;
        self
    }

    /// set the commit message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// set the author/committer signature
    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    /// create a ref pointing at this commit (must not exist yet)
    pub fn update_ref(mut self, refname: impl Into<String>) -> Self {
        self.update_ref = Some(refname.into());
        self
    }

    /// create the commit and return its ID
    pub fn commit(self) -> StorageResult<CommitId> {
        let tree_id = self
            .tree_id
            .ok_or_else(|| StorageError::Internal("commit requires a tree".to_string()))?;

        let tree = self
            .repo
            .find_tree(tree_id.raw())
            .map_err(|e| {
                StorageError::or_not_found(e, || StorageError::ObjectNotFound(tree_id.to_string()))
            })?;
        let sig = self.signature.to_git2_signature()?;

        // collect parent commits
        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| {
                let missing = || StorageError::CommitNotFound(id.to_string());
                self.repo
                    .find_commit(id.raw())
                    .map_err(|e| StorageError::or_not_found(e, missing))
            })
            .collect::<Result<_, _>>()?;

        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self
            .repo
            .commit(self.update_ref.as_deref(), &sig, &sig, &self.message, &tree, &parent_refs)?;

        Ok(CommitId::new(oid))
    }
}

/// get information about a commit
pub fn get_commit(repo: &Repository, id: CommitId) -> StorageResult<CommitInfo> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|e| {
            StorageError::or_not_found(e, || StorageError::CommitNotFound(id.to_string()))
        })?;

    Ok(CommitInfo::from_git2(&commit))
}

/// create the root commit of a new repository on `refname`
pub fn create_initial_commit(
    repo: &Repository,
    refname: &str,
    signature: &Signature,
) -> StorageResult<CommitId> {
    let tree_id = tree::empty_tree(repo)?;

    CommitBuilder::new(repo)
        .tree(tree_id)
        .message("Repository created")
        .signature(signature.clone())
        .update_ref(refname)
        .commit()
}

/// find the merge base (common ancestor) of two commits
///
/// returns None if there is no common ancestor
pub fn find_merge_base(
    repo: &Repository,
    a: CommitId,
    b: CommitId,
) -> StorageResult<Option<CommitId>> {
    match repo.merge_base(a.raw(), b.raw()) {
        Ok(oid) => Ok(Some(CommitId::new(oid))),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(StorageError::Git(e)),
    }
}

/// whether `ancestor` is reachable from `descendant` (a commit counts as its own ancestor)
pub fn is_ancestor(
    repo: &Repository,
    ancestor: CommitId,
    descendant: CommitId,
) -> StorageResult<bool> {
    if ancestor == descendant {
        return Ok(true);
    }
    Ok(repo.graph_descendant_of(descendant.raw(), ancestor.raw())?)
}

/// Opaque pagination cursor for history listings.
///
/// Encodes the commit time and id of the last commit of a page as
/// `"<unix-seconds>.<hex>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryCursor {
    pub time: i64,
    pub id: CommitId,
}

impl HistoryCursor {
    pub fn from_commit(info: &CommitInfo) -> Self {
        Self {
            time: info.timestamp.timestamp(),
            id: info.id,
        }
    }
}

impl fmt::Display for HistoryCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.time, self.id)
    }
}

impl FromStr for HistoryCursor {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidNameError::InvalidHash(s.to_string());
        let (time, id) = s.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            time: time.parse().map_err(|_| invalid())?,
            id: CommitId::from_hex(id)?,
        })
    }
}

/// one page of history
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub commits: Vec<CommitInfo>,
    /// cursor for the following page, absent on the last page
    #[serde(serialize_with = "serialize_cursor")]
    pub next: Option<HistoryCursor>,
}

fn serialize_cursor<S: serde::Serializer>(
    cursor: &Option<HistoryCursor>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match cursor {
        Some(c) => s.serialize_some(&c.to_string()),
        None => s.serialize_none(),
    }
}

/// iterate over commit history starting from a commit
///
/// newest first by commit time; ties fall back to topological order
/// (children before parents), which keeps the order deterministic
pub struct HistoryIterator<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> HistoryIterator<'repo> {
    /// create a new history iterator
    pub fn new(repo: &'repo Repository, start: CommitId) -> StorageResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk
            .push(start.raw())
            .map_err(|e| {
                StorageError::or_not_found(e, || StorageError::CommitNotFound(start.to_string()))
            })?;
        revwalk.set_sorting(Sort::TIME | Sort::TOPOLOGICAL)?;

        Ok(Self { repo, revwalk })
    }
}

impl<'repo> Iterator for HistoryIterator<'repo> {
    type Item = StorageResult<CommitInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.revwalk.next()? {
            Ok(oid) => match self.repo.find_commit(oid) {
                Ok(commit) => Some(Ok(CommitInfo::from_git2(&commit))),
                Err(e) => Some(Err(StorageError::Git(e))),
            },
            Err(e) => Some(Err(StorageError::Git(e))),
        }
    }
}

/// get history for a commit
pub fn history(repo: &Repository, start: CommitId) -> StorageResult<HistoryIterator<'_>> {
    HistoryIterator::new(repo, start)
}

/// one page of history, resuming after `after` when given
///
/// everything at or before the cursor position in walk order is skipped. If
/// the cursor commit is not part of this history, skipping stops at the first
/// commit older than the cursor time.
pub fn history_page(
    repo: &Repository,
    start: CommitId,
    after: Option<HistoryCursor>,
    limit: usize,
    cancel: &CancelToken,
) -> StorageResult<HistoryPage> {
    let mut commits = Vec::with_capacity(limit.min(256));
    let mut skipping = after;
    let mut has_more = false;

    for item in history(repo, start)? {
        cancel.check()?;
        let info = item?;

        if let Some(cursor) = skipping {
            if info.id == cursor.id {
                skipping = None;
                continue;
            }
            if info.timestamp.timestamp() >= cursor.time {
                continue;
            }
            skipping = None;
        }

        if commits.len() == limit {
            has_more = true;
            break;
        }
        commits.push(info);
    }

    let next = if has_more { commits.last().map(HistoryCursor::from_commit) } else { None };
    Ok(HistoryPage { commits, next })
}
