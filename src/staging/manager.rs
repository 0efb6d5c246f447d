//! Staging manager - coordinates all WIP operations.
//!
//! The StagingManager is the main entry point for staged edits.
//! It handles:
//! - Opening (create-if-absent) the one WIP of a branch
//! - Staging object writes and removals
//! - Committing a WIP onto its branch, re-basing when the branch moved
//! - Discarding WIPs
//!
//! Every mutation of a (repository, branch) pair runs under that pair's lock;
//! the ref compare-and-swap underneath still catches writers in other
//! processes.

use std::path::PathBuf;

use crate::staging::locks::KeyedLocks;
use crate::staging::wip::{self, Wip, WipStatus};
use crate::storage::commit::{get_commit, CommitBuilder};
use crate::storage::diff::diff_trees;
use crate::storage::merge::apply_changes;
use crate::storage::object::put_object;
use crate::storage::tree::{EntryKind, TreeMutator};
use crate::storage::{
    BranchName, CancelToken, Change, CommitInfo, GitRepository, ObjectMeta, ObjectPath, RefManager,
    Signature, StorageError, StorageResult, TreeEntryInfo,
};

/// Staging manager - coordinates all WIP operations.
///
/// Thread-safe: share it behind an `Arc`.
#[derive(Default)]
pub struct StagingManager {
    locks: KeyedLocks<(PathBuf, BranchName)>,
}

impl StagingManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock of (repository, branch).
    ///
    /// Merges into a branch take the same lock so they serialize with commits.
    pub fn with_branch_lock<T>(
        &self,
        repo: &GitRepository,
        branch: &BranchName,
        f: impl FnOnce() -> T,
    ) -> T {
        let key = (repo.path().to_path_buf(), branch.clone());
        self.locks.with_lock(&key, f)
    }

    /// Return the branch's WIP, creating it from the branch head if absent.
    pub fn open(
        &self,
        repo: &GitRepository,
        branch: &BranchName,
        creator: &str,
    ) -> StorageResult<(Wip, WipStatus)> {
        self.with_branch_lock(repo, branch, || {
            repo.with_repo(|r| {
                if let Some(existing) = Wip::load(r, branch)? {
                    return Ok((existing, WipStatus::Existing));
                }

                let head = RefManager::resolve_branch(r, branch)?;
                let tree = get_commit(r, head)?.tree_id;
                let snapshot = Wip::write_snapshot(r, head, tree, creator, wip::now())?;

                let wip_ref = branch.wip_ref_path();
                let created = RefManager::create_ref_if_absent(r, &wip_ref, snapshot, "wip: open")?;
                let status = if created { WipStatus::Created } else { WipStatus::Existing };
                if created {
                    tracing::info!(
                        repo = %repo.path().display(),
                        branch = %branch,
                        base = %head,
                        "wip opened"
                    );
                }

                Ok((Wip::require(r, branch)?, status))
            })
        })
    }

    /// Current state of the branch's WIP.
    pub fn get(&self, repo: &GitRepository, branch: &BranchName) -> StorageResult<Wip> {
        repo.with_repo(|r| Wip::require(r, branch))
    }

    /// All live WIPs, ordered by branch name.
    pub fn list(&self, repo: &GitRepository) -> StorageResult<Vec<Wip>> {
        repo.with_repo(|r| {
            let mut wips = Vec::new();
            for (refname, _) in RefManager::list_refs(r, "refs/wip/*")? {
                let Some(branch) = BranchName::from_wip_ref_path(&refname) else { continue };
                if let Some(wip) = Wip::load(r, &branch)? {
                    wips.push(wip);
                }
            }
            wips.sort_by(|a, b| a.branch.cmp(&b.branch));
            Ok(wips)
        })
    }

    /// Store `bytes` and stage them at `path`.
    pub fn put_object(
        &self,
        repo: &GitRepository,
        branch: &BranchName,
        path: &ObjectPath,
        bytes: &[u8],
    ) -> StorageResult<ObjectMeta> {
        self.with_branch_lock(repo, branch, || {
            repo.with_repo(|r| {
                let wip = Wip::require(r, branch)?;
                let blob = put_object(r, bytes)?;

                let mut mutator = TreeMutator::from_tree(r, wip.tree);
                mutator.upsert(path, blob)?;
                wip.update_tree(r, mutator.write()?)?;

                tracing::debug!(branch = %branch, path = %path, object = %blob, "object staged");
                Ok(ObjectMeta {
                    id: blob,
                    size: bytes.len() as u64,
                })
            })
        })
    }

    /// Stage the removal of the file at `path`.
    pub fn delete_object(
        &self,
        repo: &GitRepository,
        branch: &BranchName,
        path: &ObjectPath,
    ) -> StorageResult<()> {
        self.with_branch_lock(repo, branch, || {
            repo.with_repo(|r| {
                let wip = Wip::require(r, branch)?;

                let mut mutator = TreeMutator::from_tree(r, wip.tree);
                if mutator.effective_kind(path)? != Some(EntryKind::Blob) {
                    return Err(StorageError::PathNotFound(path.to_string()));
                }
                mutator.remove(path)?;
                wip.update_tree(r, mutator.write()?)?;

                tracing::debug!(branch = %branch, path = %path, "removal staged");
                Ok(())
            })
        })
    }

    /// Metadata of a file in the working tree.
    pub fn stat(
        &self,
        repo: &GitRepository,
        branch: &BranchName,
        path: &ObjectPath,
    ) -> StorageResult<ObjectMeta> {
        let wip = self.get(repo, branch)?;
        repo.stat_path(wip.tree, path)
    }

    /// Bytes of a file in the working tree.
    pub fn read(
        &self,
        repo: &GitRepository,
        branch: &BranchName,
        path: &ObjectPath,
    ) -> StorageResult<(ObjectMeta, Vec<u8>)> {
        let wip = self.get(repo, branch)?;
        repo.read_path(wip.tree, path)
    }

    /// Directory listing of the working tree.
    pub fn list_entries(
        &self,
        repo: &GitRepository,
        branch: &BranchName,
        prefix: Option<&ObjectPath>,
    ) -> StorageResult<Vec<TreeEntryInfo>> {
        let wip = self.get(repo, branch)?;
        repo.list_entries(wip.tree, prefix)
    }

    /// Every file of the working tree with its bytes.
    pub fn read_all(
        &self,
        repo: &GitRepository,
        branch: &BranchName,
        cancel: &CancelToken,
    ) -> StorageResult<Vec<(ObjectPath, Vec<u8>)>> {
        let wip = self.get(repo, branch)?;
        repo.read_all(wip.tree, cancel)
    }

    /// Staged changes relative to the WIP's base commit.
    pub fn changes(
        &self,
        repo: &GitRepository,
        branch: &BranchName,
        filter: Option<&ObjectPath>,
    ) -> StorageResult<Vec<Change>> {
        repo.with_repo(|r| {
            let wip = Wip::require(r, branch)?;
            let base_tree = get_commit(r, wip.base)?.tree_id;
            diff_trees(r, Some(base_tree), Some(wip.tree), filter)
        })
    }

    /// Commit the WIP onto its branch and destroy it.
    ///
    /// When the branch moved since the WIP was opened, the staged changes are
    /// replayed onto the current head. Advancing the branch and removing the
    /// WIP happen in one ref transaction.
    pub fn commit(
        &self,
        repo: &GitRepository,
        branch: &BranchName,
        message: &str,
        committer: &Signature,
    ) -> StorageResult<CommitInfo> {
        self.with_branch_lock(repo, branch, || {
            repo.with_repo(|r| {
                let wip = Wip::require(r, branch)?;
                let head = RefManager::resolve_branch(r, branch)?;

                let tree = if head == wip.base {
                    wip.tree
                } else {
                    let base_tree = get_commit(r, wip.base)?.tree_id;
                    let head_tree = get_commit(r, head)?.tree_id;
                    let staged = diff_trees(r, Some(base_tree), Some(wip.tree), None)?;
                    tracing::debug!(
                        branch = %branch,
                        base = %wip.base,
                        head = %head,
                        "re-basing stale wip"
                    );
                    apply_changes(r, head_tree, wip.tree, &staged)?
                };

                let commit = CommitBuilder::new(r)
                    .tree(tree)
                    .parent(head)
                    .message(message)
                    .signature(committer.clone())
                    .commit()?;

                RefManager::advance_and_remove(
                    r,
                    branch,
                    head,
                    commit,
                    &branch.wip_ref_path(),
                    wip.snapshot,
                    &format!("commit: {}", message.lines().next().unwrap_or("")),
                )?;

                tracing::info!(branch = %branch, commit = %commit, "wip committed");
                get_commit(r, commit)
            })
        })
    }

    /// Destroy the WIP without committing.
    pub fn discard(&self, repo: &GitRepository, branch: &BranchName) -> StorageResult<()> {
        self.with_branch_lock(repo, branch, || {
            repo.with_repo(|r| {
                let wip = Wip::require(r, branch)?;
                RefManager::delete_ref_if(r, &branch.wip_ref_path(), wip.snapshot)?;
                tracing::info!(branch = %branch, "wip discarded");
                Ok(())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChangeAction, RefSpec};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitRepository, StagingManager) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alice/data.git");
        let repo = GitRepository::init(path, &BranchName::main(), &Signature::system()).unwrap();
        (dir, repo, StagingManager::new())
    }

    fn path(p: &str) -> ObjectPath {
        ObjectPath::new(p).unwrap()
    }

    #[test]
    fn test_open_is_create_then_reuse() {
        let (_dir, repo, staging) = setup();
        let main = BranchName::main();

        let (first, status) = staging.open(&repo, &main, "alice").unwrap();
        assert_eq!(status, WipStatus::Created);
        assert_eq!(first.creator, "alice");
        assert_eq!(first.base, repo.resolve(&RefSpec::Branch(main.clone())).unwrap());

        let (second, status) = staging.open(&repo, &main, "bob").unwrap();
        assert_eq!(status, WipStatus::Existing);
        assert_eq!(second, first);
    }

    #[test]
    fn test_open_unknown_branch() {
        let (_dir, repo, staging) = setup();
        let result = staging.open(&repo, &BranchName::new("ghost").unwrap(), "alice");
        assert!(matches!(result, Err(StorageError::RefNotFound(_))));
    }

    #[test]
    fn test_put_commit_round_trip() {
        let (_dir, repo, staging) = setup();
        let main = BranchName::main();
        staging.open(&repo, &main, "alice").unwrap();

        let meta = staging.put_object(&repo, &main, &path("a.bin"), b"X").unwrap();
        assert_eq!(meta.size, 1);
        assert_eq!(staging.read(&repo, &main, &path("a.bin")).unwrap().1, b"X");

        let changes = staging.changes(&repo, &main, None).unwrap();
        assert_eq!(changes, vec![Change::new(path("a.bin"), ChangeAction::Added)]);

        let alice = Signature::new("alice", "alice@example.com");
        let commit = staging.commit(&repo, &main, "add a", &alice).unwrap();
        assert_eq!(commit.message, "add a");
        assert_eq!(repo.resolve(&RefSpec::Branch(main.clone())).unwrap(), commit.id);

        let (_, bytes) = repo.read_path(commit.tree_id, &path("a.bin")).unwrap();
        assert_eq!(bytes, b"X");

        // the WIP is gone after commit
        let again = staging.commit(&repo, &main, "again", &Signature::system());
        assert!(matches!(again, Err(StorageError::WipNotFound(_))));
    }

    #[test]
    fn test_empty_commit_is_allowed() {
        let (_dir, repo, staging) = setup();
        let main = BranchName::main();
        let before = repo.resolve(&RefSpec::Branch(main.clone())).unwrap();

        staging.open(&repo, &main, "alice").unwrap();
        let commit = staging.commit(&repo, &main, "nothing", &Signature::system()).unwrap();
        assert_eq!(commit.parent_ids, vec![before]);
        assert_eq!(commit.tree_id, repo.tree_of(before).unwrap());
    }

    #[test]
    fn test_delete_object() {
        let (_dir, repo, staging) = setup();
        let main = BranchName::main();
        staging.open(&repo, &main, "alice").unwrap();
        staging.put_object(&repo, &main, &path("d/a.bin"), b"1").unwrap();

        assert!(matches!(
            staging.delete_object(&repo, &main, &path("missing")),
            Err(StorageError::PathNotFound(_))
        ));
        // directories are not objects
        assert!(matches!(
            staging.delete_object(&repo, &main, &path("d")),
            Err(StorageError::PathNotFound(_))
        ));

        staging.delete_object(&repo, &main, &path("d/a.bin")).unwrap();
        assert!(staging.list_entries(&repo, &main, None).unwrap().is_empty());
        assert!(staging.changes(&repo, &main, None).unwrap().is_empty());
    }

    #[test]
    fn test_put_rejects_path_conflicts() {
        let (_dir, repo, staging) = setup();
        let main = BranchName::main();
        staging.open(&repo, &main, "alice").unwrap();
        staging.put_object(&repo, &main, &path("f"), b"1").unwrap();

        let result = staging.put_object(&repo, &main, &path("f/child"), b"2");
        assert!(matches!(result, Err(StorageError::PathConflict { .. })));
    }

    #[test]
    fn test_stale_wip_is_rebased() {
        let (_dir, repo, staging) = setup();
        let main = BranchName::main();

        // a WIP opened on the old head
        staging.open(&repo, &main, "alice").unwrap();
        staging.put_object(&repo, &main, &path("mine"), b"m").unwrap();

        // meanwhile the branch moves through a second branch's merge
        let other = BranchName::new("other").unwrap();
        repo.create_branch(&other, &RefSpec::Branch(main.clone())).unwrap();
        staging.open(&repo, &other, "bob").unwrap();
        staging.put_object(&repo, &other, &path("theirs"), b"t").unwrap();
        staging.commit(&repo, &other, "theirs", &Signature::system()).unwrap();
        let moved = repo
            .merge(&other, &main, "ff", &Signature::system(), Default::default())
            .unwrap();

        let commit = staging.commit(&repo, &main, "mine", &Signature::system()).unwrap();
        assert_eq!(commit.parent_ids, vec![moved.commit]);
        let names: Vec<_> =
            repo.list_entries(commit.tree_id, None).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["mine", "theirs"]);
    }

    #[test]
    fn test_discard() {
        let (_dir, repo, staging) = setup();
        let main = BranchName::main();
        let head = repo.resolve(&RefSpec::Branch(main.clone())).unwrap();

        staging.open(&repo, &main, "alice").unwrap();
        staging.put_object(&repo, &main, &path("a"), b"1").unwrap();
        staging.discard(&repo, &main).unwrap();

        assert!(matches!(staging.get(&repo, &main), Err(StorageError::WipNotFound(_))));
        assert!(matches!(staging.discard(&repo, &main), Err(StorageError::WipNotFound(_))));
        assert_eq!(repo.resolve(&RefSpec::Branch(main)).unwrap(), head);
    }

    #[test]
    fn test_list_wips() {
        let (_dir, repo, staging) = setup();
        let main = BranchName::main();
        let dev = BranchName::new("dev").unwrap();
        repo.create_branch(&dev, &RefSpec::Branch(main.clone())).unwrap();

        staging.open(&repo, &main, "alice").unwrap();
        staging.open(&repo, &dev, "alice").unwrap();

        let branches: Vec<_> = staging
            .list(&repo)
            .unwrap()
            .into_iter()
            .map(|w| w.branch.to_string())
            .collect();
        assert_eq!(branches, vec!["dev", "main"]);
    }

    #[test]
    fn test_concurrent_open_creates_once() {
        let (_dir, repo, staging) = setup();
        let staging = Arc::new(staging);
        let main = BranchName::main();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                let staging = Arc::clone(&staging);
                let main = main.clone();
                thread::spawn(move || staging.open(&repo, &main, &format!("user{}", i)).unwrap())
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|(_, s)| *s == WipStatus::Created).count();
        assert_eq!(created, 1);
        assert!(results.windows(2).all(|w| w[0].0 == w[1].0));
    }
}
