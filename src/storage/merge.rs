//! Branch merging.
//!
//! Merges are path-level: a path changed on the winning side takes that
//! side's object whole. Object bytes are never merged.

use std::collections::HashMap;

use git2::Repository;
use serde::{Deserialize, Serialize};

use crate::storage::commit::{find_merge_base, get_commit, is_ancestor, CommitBuilder};
use crate::storage::diff::diff_trees;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::tree::{find_tree, TreeMutator};
use crate::storage::types::{
    BranchName, Change, ChangeAction, CommitId, ObjectPath, Signature, TreeId,
};

/// how the merged tree is computed when both branches have moved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// apply every difference between target and source onto target; the
    /// merged tree equals the source tree
    #[default]
    Overwrite,
    /// apply only what source changed since the merge base; target-only
    /// edits survive and overlapping paths take source's version
    SourceWins,
    /// like `SourceWins`, but reject paths both sides changed differently
    FailOnConflict,
}

/// what a merge did to the target branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeKind {
    /// a two-parent merge commit was created
    Merged,
    /// the target pointer moved forward to the source head
    FastForward,
    /// nothing to merge; target already contains source
    UpToDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// target head after the merge
    pub commit: CommitId,
    pub kind: MergeKind,
}

/// apply `changes` onto `onto`, taking added and modified objects from `from`
///
/// deletions of paths already gone are skipped; files or directories in the
/// way of an incoming object are replaced
pub fn apply_changes(
    repo: &Repository,
    onto: TreeId,
    from: TreeId,
    changes: &[Change],
) -> StorageResult<TreeId> {
    let source = find_tree(repo, from)?;
    let mut mutator = TreeMutator::from_tree(repo, onto);

    for change in changes {
        match change.action {
            ChangeAction::Deleted => match mutator.remove(&change.path) {
                Ok(()) | Err(StorageError::PathNotFound(_)) => {}
                Err(e) => return Err(e),
            },
            ChangeAction::Added | ChangeAction::Modified => {
                let entry = source.lookup(repo, &change.path)?;
                let blob = entry.blob_id().ok_or_else(|| {
                    let reason = format!("change at {} does not name a file", change.path);
                    StorageError::Internal(reason)
                })?;
                mutator.replace(&change.path, blob)?;
            }
        }
    }

    mutator.write()
}

/// paths changed on both sides since their merge base, ending up different
///
/// histories without a common ancestor are compared against an empty base
pub fn detect_conflicts(
    repo: &Repository,
    ours: CommitId,
    theirs: CommitId,
) -> StorageResult<Vec<ObjectPath>> {
    let base_tree = match find_merge_base(repo, ours, theirs)? {
        Some(base) => Some(get_commit(repo, base)?.tree_id),
        None => None,
    };
    let our_tree = get_commit(repo, ours)?.tree_id;
    let their_tree = get_commit(repo, theirs)?.tree_id;

    let our_changes: HashMap<ObjectPath, ChangeAction> =
        diff_trees(repo, base_tree, Some(our_tree), None)?
            .into_iter()
            .map(|c| (c.path, c.action))
            .collect();
    let their_changes = diff_trees(repo, base_tree, Some(their_tree), None)?;

    let ours_handle = find_tree(repo, our_tree)?;
    let theirs_handle = find_tree(repo, their_tree)?;

    let mut conflicts = Vec::new();
    for change in their_changes {
        if !our_changes.contains_key(&change.path) {
            continue;
        }
        // both sides made the same edit
        let mine = ours_handle.try_lookup(repo, &change.path)?.map(|e| e.hash);
        let yours = theirs_handle.try_lookup(repo, &change.path)?.map(|e| e.hash);
        if mine != yours {
            conflicts.push(change.path);
        }
    }

    Ok(conflicts)
}

/// compute the merged tree of `source` into `target`
pub fn merge_trees(
    repo: &Repository,
    target: CommitId,
    source: CommitId,
    strategy: MergeStrategy,
) -> StorageResult<TreeId> {
    let target_tree = get_commit(repo, target)?.tree_id;
    let source_tree = get_commit(repo, source)?.tree_id;

    let changes = match strategy {
        MergeStrategy::Overwrite => diff_trees(repo, Some(target_tree), Some(source_tree), None)?,
        MergeStrategy::SourceWins | MergeStrategy::FailOnConflict => {
            if strategy == MergeStrategy::FailOnConflict {
                let conflicting = detect_conflicts(repo, target, source)?;
                if !conflicting.is_empty() {
                    return Err(StorageError::MergeConflict {
                        conflicting_paths: conflicting.into_iter().map(String::from).collect(),
                    });
                }
            }
            let base_tree = match find_merge_base(repo, target, source)? {
                Some(base) => Some(get_commit(repo, base)?.tree_id),
                None => None,
            };
            diff_trees(repo, base_tree, Some(source_tree), None)?
        }
    };

    apply_changes(repo, target_tree, source_tree, &changes)
}

/// merge branch `source` into branch `target`
///
/// the target only advances if it still points where it did when the merge
/// started; a concurrent writer makes this fail with `ConcurrentModification`
pub fn merge_branches(
    repo: &Repository,
    source: &BranchName,
    target: &BranchName,
    message: &str,
    committer: &Signature,
    strategy: MergeStrategy,
) -> StorageResult<MergeOutcome> {
    if source == target {
        let reason = format!("cannot merge branch {} into itself", source);
        return Err(StorageError::InvalidMerge(reason));
    }

    let source_head = RefManager::resolve_branch(repo, source)?;
    let target_head = RefManager::resolve_branch(repo, target)?;

    if source_head == target_head || is_ancestor(repo, source_head, target_head)? {
        return Ok(MergeOutcome {
            commit: target_head,
            kind: MergeKind::UpToDate,
        });
    }

    if is_ancestor(repo, target_head, source_head)? {
        RefManager::update_branch_if_unchanged(repo, target, target_head, source_head)?;
        tracing::info!(
            source = %source,
            target = %target,
            commit = %source_head,
            "fast-forward merge"
        );
        return Ok(MergeOutcome {
            commit: source_head,
            kind: MergeKind::FastForward,
        });
    }

    let tree = merge_trees(repo, target_head, source_head, strategy)?;
    let commit = CommitBuilder::new(repo)
        .tree(tree)
        .parents(vec![target_head, source_head])
        .message(message)
        .signature(committer.clone())
        .commit()?;

    RefManager::update_branch_if_unchanged(repo, target, target_head, commit)?;
    tracing::info!(
        source = %source,
        target = %target,
        commit = %commit,
        ?strategy,
        "merge commit created"
    );

    Ok(MergeOutcome {
        commit,
        kind: MergeKind::Merged,
    })
}

/// default message for a merge commit
pub fn merge_message(source: &BranchName, target: &BranchName) -> String {
    format!("Merge branch '{}' into '{}'", source, target)
}
