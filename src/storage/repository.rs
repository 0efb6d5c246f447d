//!   Core Git repository wrapper.
//!
//!  This is the central component of the storage layer. It wraps one bare
//!  git repository (one data repository) and provides the high-level
//!  operations the rest of the system uses.
//!
//! `git2::Repository` is not `Sync`, so the handle stores only the path and
//! opens the repository for each operation. All shared state lives on disk in
//! the object database and the refs, which git updates atomically.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::Repository;

use crate::storage::cancel::CancelToken;
use crate::storage::commit::{self, CommitInfo, HistoryCursor, HistoryPage};
use crate::storage::diff;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::merge::{self, MergeOutcome, MergeStrategy};
use crate::storage::object::{self, ObjectMeta};
use crate::storage::refs::{BranchInfo, RefManager, RefSpec, TagInfo};
use crate::storage::tree::{self, find_tree, TreeEntryInfo};
use crate::storage::types::{
    BlobId, BranchName, Change, CommitId, ObjectPath, Signature, TagName, TreeId,
};

/// Handle to one bare data repository.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone, Debug)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

#[derive(Debug)]
struct GitRepositoryInner {
    path: PathBuf,
}

impl GitRepository {
    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        Repository::open_bare(path).map_err(|_| StorageError::NotInitialized(path.to_path_buf()))?;

        Ok(Self {
            inner: Arc::new(GitRepositoryInner {
                path: path.to_path_buf(),
            }),
        })
    }

    /// Initialize a new bare repository whose default branch points at an
    /// empty initial commit.
    pub fn init(
        path: impl AsRef<Path>,
        default_branch: &BranchName,
        signature: &Signature,
    ) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(StorageError::Internal(format!("{} already exists", path.display())));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let repo = Repository::init_bare(path)?;
        let head_ref = default_branch.as_ref_path();
        let commit_id = commit::create_initial_commit(&repo, &head_ref, signature)?;
        repo.set_head(&head_ref)?;
        tracing::debug!(path = %path.display(), commit = %commit_id, "initialized bare repository");

        Ok(Self {
            inner: Arc::new(GitRepositoryInner {
                path: path.to_path_buf(),
            }),
        })
    }

    /// Get the repository path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Execute a function with a freshly opened repository.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = Repository::open_bare(&self.inner.path)
            .map_err(|_| StorageError::NotInitialized(self.inner.path.clone()))?;
        f(&repo)
    }

    /// Remove the repository from disk: refs, WIPs and objects.
    pub fn destroy(self) -> StorageResult<()> {
        fs::remove_dir_all(&self.inner.path)?;
        Ok(())
    }

    // ==================== Ref Operations ====================

    /// Resolve a typed ref to a commit.
    pub fn resolve(&self, spec: &RefSpec) -> StorageResult<CommitId> {
        self.with_repo(|repo| RefManager::resolve(repo, spec))
    }

    /// Resolve a branch, tag or commit hash given by name.
    pub fn resolve_name(&self, name: &str) -> StorageResult<CommitId> {
        self.with_repo(|repo| RefManager::resolve_name(repo, name))
    }

    /// Point HEAD at another branch.
    pub fn set_default_branch(&self, branch: &BranchName) -> StorageResult<()> {
        self.with_repo(|repo| RefManager::set_default_branch(repo, branch))
    }

    pub fn get_branch(&self, branch: &BranchName) -> StorageResult<BranchInfo> {
        self.with_repo(|repo| {
            Ok(BranchInfo {
                name: branch.clone(),
                commit: RefManager::resolve_branch(repo, branch)?,
            })
        })
    }

    pub fn list_branches(&self) -> StorageResult<Vec<BranchInfo>> {
        self.with_repo(RefManager::list_branches)
    }

    /// Create a branch at whatever `source` resolves to.
    pub fn create_branch(
        &self,
        branch: &BranchName,
        source: &RefSpec,
    ) -> StorageResult<BranchInfo> {
        self.with_repo(|repo| {
            let commit = RefManager::resolve(repo, source)?;
            RefManager::create_branch(repo, branch, commit)?;
            Ok(BranchInfo {
                name: branch.clone(),
                commit,
            })
        })
    }

    /// Delete a branch and its WIP. The default branch is refused.
    pub fn delete_branch(
        &self,
        branch: &BranchName,
        default_branch: &BranchName,
    ) -> StorageResult<()> {
        if branch == default_branch {
            return Err(StorageError::DefaultBranch(branch.to_string()));
        }
        self.with_repo(|repo| RefManager::delete_branch(repo, branch))
    }

    /// Create an annotated tag at whatever `target` resolves to.
    pub fn create_tag(
        &self,
        tag: &TagName,
        target: &RefSpec,
        message: &str,
        tagger: &Signature,
    ) -> StorageResult<TagInfo> {
        self.with_repo(|repo| {
            let commit = RefManager::resolve(repo, target)?;
            RefManager::create_tag(repo, tag, commit, message, tagger)
        })
    }

    pub fn get_tag(&self, tag: &TagName) -> StorageResult<TagInfo> {
        self.with_repo(|repo| RefManager::get_tag(repo, tag))
    }

    pub fn list_tags(&self) -> StorageResult<Vec<TagInfo>> {
        self.with_repo(RefManager::list_tags)
    }

    pub fn delete_tag(&self, tag: &TagName) -> StorageResult<()> {
        self.with_repo(|repo| RefManager::delete_tag(repo, tag))
    }

    // ==================== Commit Operations ====================

    /// Get information about a commit.
    pub fn get_commit(&self, id: CommitId) -> StorageResult<CommitInfo> {
        self.with_repo(|repo| commit::get_commit(repo, id))
    }

    /// One page of history, newest first.
    pub fn history_page(
        &self,
        start: CommitId,
        after: Option<HistoryCursor>,
        limit: usize,
        cancel: &CancelToken,
    ) -> StorageResult<HistoryPage> {
        self.with_repo(|repo| commit::history_page(repo, start, after, limit, cancel))
    }

    // ==================== Tree & Object Operations ====================

    /// Whether a blob with this hash is stored.
    pub fn object_exists(&self, id: BlobId) -> StorageResult<bool> {
        self.with_repo(|repo| object::object_exists(repo, id))
    }

    /// Store the trees for a flat path → blob listing and return the root.
    ///
    /// Every blob must already be stored.
    pub fn build_tree(
        &self,
        entries: impl IntoIterator<Item = (ObjectPath, BlobId)>,
    ) -> StorageResult<TreeId> {
        self.with_repo(|repo| {
            let entries: Vec<_> = entries.into_iter().collect();
            for (_, blob) in &entries {
                if !object::object_exists(repo, *blob)? {
                    return Err(StorageError::ObjectNotFound(blob.to_string()));
                }
            }
            tree::build_tree(repo, entries)
        })
    }

    /// Root tree of a commit.
    pub fn tree_of(&self, commit: CommitId) -> StorageResult<TreeId> {
        Ok(self.get_commit(commit)?.tree_id)
    }

    /// List a directory of a tree; `None` lists the root.
    pub fn list_entries(
        &self,
        tree: TreeId,
        prefix: Option<&ObjectPath>,
    ) -> StorageResult<Vec<TreeEntryInfo>> {
        self.with_repo(|repo| find_tree(repo, tree)?.list_children(repo, prefix))
    }

    /// Metadata of the file at `path`.
    pub fn stat_path(&self, tree: TreeId, path: &ObjectPath) -> StorageResult<ObjectMeta> {
        self.with_repo(|repo| {
            let entry = find_tree(repo, tree)?.lookup(repo, path)?;
            let blob = entry.blob_id().ok_or_else(|| StorageError::PathNotFound(path.to_string()))?;
            object::stat_object(repo, blob)
        })
    }

    /// Metadata and bytes of the file at `path`.
    pub fn read_path(
        &self,
        tree: TreeId,
        path: &ObjectPath,
    ) -> StorageResult<(ObjectMeta, Vec<u8>)> {
        self.with_repo(|repo| {
            let entry = find_tree(repo, tree)?.lookup(repo, path)?;
            let blob = entry.blob_id().ok_or_else(|| StorageError::PathNotFound(path.to_string()))?;
            let bytes = object::get_object(repo, blob)?;
            Ok((
                ObjectMeta {
                    id: blob,
                    size: bytes.len() as u64,
                },
                bytes,
            ))
        })
    }

    /// Every file of a tree with its bytes, in path order.
    ///
    /// The cancel token is checked before each object read.
    pub fn read_all(
        &self,
        tree: TreeId,
        cancel: &CancelToken,
    ) -> StorageResult<Vec<(ObjectPath, Vec<u8>)>> {
        self.with_repo(|repo| {
            let files = find_tree(repo, tree)?.walk_files(repo)?;
            let mut out = Vec::with_capacity(files.len());
            for (path, blob) in files {
                cancel.check()?;
                out.push((path, object::get_object(repo, blob)?));
            }
            Ok(out)
        })
    }

    /// Diff two trees, optionally scoped to a path.
    pub fn diff(
        &self,
        base: TreeId,
        head: TreeId,
        filter: Option<&ObjectPath>,
    ) -> StorageResult<Vec<Change>> {
        self.with_repo(|repo| diff::diff_trees(repo, Some(base), Some(head), filter))
    }

    // ==================== Merge Operations ====================

    /// Merge branch `source` into branch `target`.
    pub fn merge(
        &self,
        source: &BranchName,
        target: &BranchName,
        message: &str,
        committer: &Signature,
        strategy: MergeStrategy,
    ) -> StorageResult<MergeOutcome> {
        self.with_repo(|repo| {
            merge::merge_branches(repo, source, target, message, committer, strategy)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tree::TreeMutator;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitRepository) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alice/data.git");
        let repo = GitRepository::init(path, &BranchName::main(), &Signature::system()).unwrap();
        (dir, repo)
    }

    fn commit_file(repo: &GitRepository, path: &str, bytes: &[u8]) -> CommitId {
        repo.with_repo(|r| {
            let main = BranchName::main();
            let head = RefManager::resolve_branch(r, &main)?;
            let blob = object::put_object(r, bytes)?;
            let mut mutator = TreeMutator::from_tree(r, commit::get_commit(r, head)?.tree_id);
            mutator.upsert(&ObjectPath::new(path)?, blob)?;
            let tree = mutator.write()?;
            let id = commit::CommitBuilder::new(r).tree(tree).parent(head).message("add").commit()?;
            RefManager::update_branch_if_unchanged(r, &main, head, id)?;
            Ok(id)
        })
        .unwrap()
    }

    #[test]
    fn test_init_and_open() {
        let (dir, repo) = setup();
        let head = repo.resolve(&RefSpec::Branch(BranchName::main())).unwrap();
        let info = repo.get_commit(head).unwrap();
        assert!(info.parent_ids.is_empty());
        assert!(repo.list_entries(info.tree_id, None).unwrap().is_empty());

        let reopened = GitRepository::open(dir.path().join("alice/data.git")).unwrap();
        assert_eq!(reopened.resolve_name("main").unwrap(), head);

        assert!(matches!(
            GitRepository::open(dir.path().join("nobody/none.git")),
            Err(StorageError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_read_paths_at_commit() {
        let (_dir, repo) = setup();
        let commit = commit_file(&repo, "data/a.csv", b"1,2,3");
        let tree = repo.tree_of(commit).unwrap();

        let meta = repo.stat_path(tree, &ObjectPath::new("data/a.csv").unwrap()).unwrap();
        assert_eq!(meta.size, 5);
        let (_, bytes) = repo.read_path(tree, &ObjectPath::new("/data/a.csv").unwrap()).unwrap();
        assert_eq!(bytes, b"1,2,3");

        // directories are not objects
        assert!(matches!(
            repo.stat_path(tree, &ObjectPath::new("data").unwrap()),
            Err(StorageError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_read_all_honours_cancel() {
        let (_dir, repo) = setup();
        let commit = commit_file(&repo, "a", b"1");
        let tree = repo.tree_of(commit).unwrap();

        assert_eq!(repo.read_all(tree, &CancelToken::new()).unwrap().len(), 1);

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(repo.read_all(tree, &cancel), Err(StorageError::Cancelled)));
    }

    #[test]
    fn test_default_branch_cannot_be_deleted() {
        let (_dir, repo) = setup();
        let main = BranchName::main();
        let feature = BranchName::new("feature").unwrap();

        repo.create_branch(&feature, &RefSpec::Branch(main.clone())).unwrap();
        assert!(matches!(repo.delete_branch(&main, &main), Err(StorageError::DefaultBranch(_))));
        repo.delete_branch(&feature, &main).unwrap();
        assert_eq!(repo.list_branches().unwrap().len(), 1);
    }

    #[test]
    fn test_build_tree_matches_committed_tree() {
        let (_dir, repo) = setup();
        let commit = commit_file(&repo, "data/a.csv", b"1,2,3");
        let tree = repo.tree_of(commit).unwrap();
        let meta = repo.stat_path(tree, &ObjectPath::new("data/a.csv").unwrap()).unwrap();

        assert!(repo.object_exists(meta.id).unwrap());
        let rebuilt = repo
            .build_tree(vec![(ObjectPath::new("data/a.csv").unwrap(), meta.id)])
            .unwrap();
        assert_eq!(rebuilt, tree);

        let missing = BlobId::from_hex("2222222222222222222222222222222222222222").unwrap();
        assert!(!repo.object_exists(missing).unwrap());
        let err = repo.build_tree(vec![(ObjectPath::new("b").unwrap(), missing)]).unwrap_err();
        assert!(matches!(err, StorageError::ObjectNotFound(_)));
    }

    #[test]
    fn test_destroy_removes_directory() {
        let (dir, repo) = setup();
        let path = dir.path().join("alice/data.git");
        repo.destroy().unwrap();
        assert!(!path.exists());
    }
}
