//!  tree operations: the hierarchical namespace index.
//!
//! in Git, a tree is a directory. Every object path `a/b/c.bin` is a chain of
//! trees ending in a blob, and every tree is itself content-addressed, so
//! identical directories across commits share one stored tree.
//!
//! this module provides read access (lookup, ordered listing, full walks) and
//! a mutator that edits paths at any depth and rebuilds the affected trees
//! bottom-up.

use std::collections::BTreeMap;

use git2::{FileMode, ObjectType, Oid, Repository, Tree};
use serde::Serialize;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BlobId, InvalidNameError, ObjectPath, TreeId};

/// what a tree entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
}

/// one entry of a tree listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntryInfo {
    pub name: String,
    pub kind: EntryKind,
    /// hex hash of the blob or sub-tree
    pub hash: String,
    #[serde(skip)]
    pub(crate) oid: Oid,
}

impl TreeEntryInfo {
    fn from_git2(entry: &git2::TreeEntry<'_>) -> Option<Self> {
        let kind = match entry.kind()? {
            ObjectType::Blob => EntryKind::Blob,
            ObjectType::Tree => EntryKind::Tree,
            // submodules and other exotic entries are never written by us
            _ => return None,
        };
        Some(Self {
            name: entry.name()?.to_string(),
            kind,
            hash: entry.id().to_string(),
            oid: entry.id(),
        })
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Tree
    }

    pub fn blob_id(&self) -> Option<BlobId> {
        (self.kind == EntryKind::Blob).then(|| BlobId::new(self.oid))
    }

    pub fn tree_id(&self) -> Option<TreeId> {
        (self.kind == EntryKind::Tree).then(|| TreeId::new(self.oid))
    }
}

/// A read only handle to a git tree
///
/// think of it as a snapshot - it won't change even if new commits are made.
pub struct TreeHandle<'repo> {
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    /// create a TreeHandle from a git2::Tree
    pub(crate) fn new(tree: Tree<'repo>) -> Self {
        Self { tree }
    }

    /// entries of this tree, ordered by name bytes
    ///
    /// git itself orders directories as if their name ended in `/`; callers
    /// expect plain lexicographic order with files and directories intermixed.
    pub fn entries(&self) -> Vec<TreeEntryInfo> {
        let mut entries: Vec<_> = self
            .tree
            .iter()
            .filter_map(|e| TreeEntryInfo::from_git2(&e))
            .collect();
        entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        entries
    }

    /// resolve a path to its entry
    ///
    /// fails with `PathNotFound` when any segment is missing, including
    /// segments below a blob
    pub fn lookup(
        &self,
        repo: &'repo Repository,
        path: &ObjectPath,
    ) -> StorageResult<TreeEntryInfo> {
        let not_found = || StorageError::PathNotFound(path.to_string());
        let mut current = self.tree.clone();
        let mut segments = path.segments().peekable();

        while let Some(segment) = segments.next() {
            let entry = current
                .get_name(segment)
                .and_then(|e| TreeEntryInfo::from_git2(&e))
                .ok_or_else(not_found)?;

            if segments.peek().is_none() {
                return Ok(entry);
            }
            if !entry.is_dir() {
                return Err(not_found());
            }
            current = repo.find_tree(entry.oid)?;
        }

        Err(not_found())
    }

    /// like `lookup`, but a missing path is `None`
    pub fn try_lookup(
        &self,
        repo: &'repo Repository,
        path: &ObjectPath,
    ) -> StorageResult<Option<TreeEntryInfo>> {
        match self.lookup(repo, path) {
            Ok(entry) => Ok(Some(entry)),
            Err(StorageError::PathNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// list the children of a directory; `None` lists the root
    pub fn list_children(
        &self,
        repo: &'repo Repository,
        prefix: Option<&ObjectPath>,
    ) -> StorageResult<Vec<TreeEntryInfo>> {
        let Some(prefix) = prefix else {
            return Ok(self.entries());
        };

        let entry = self.lookup(repo, prefix)?;
        if !entry.is_dir() {
            return Err(StorageError::NotADirectory(prefix.to_string()));
        }
        let subtree = TreeHandle::new(repo.find_tree(entry.oid)?);
        Ok(subtree.entries())
    }

    /// every file below this tree, in path order
    pub fn walk_files(&self, repo: &'repo Repository) -> StorageResult<Vec<(ObjectPath, BlobId)>> {
        let mut files = Vec::new();
        collect_files(repo, self, None, &mut files)?;
        Ok(files)
    }
}

fn collect_files(
    repo: &Repository,
    tree: &TreeHandle<'_>,
    parent: Option<&ObjectPath>,
    out: &mut Vec<(ObjectPath, BlobId)>,
) -> StorageResult<()> {
    for entry in tree.entries() {
        let path = ObjectPath::child(parent, &entry.name);
        match entry.kind {
            EntryKind::Blob => out.push((path, BlobId::new(entry.oid))),
            EntryKind::Tree => {
                let sub = TreeHandle::new(repo.find_tree(entry.oid)?);
                collect_files(repo, &sub, Some(&path), out)?;
            }
        }
    }
    Ok(())
}

/// load a tree by id
pub fn find_tree(repo: &Repository, id: TreeId) -> StorageResult<TreeHandle<'_>> {
    let tree = repo
        .find_tree(id.raw())
        .map_err(|e| {
            StorageError::or_not_found(e, || StorageError::ObjectNotFound(id.to_string()))
        })?;
    Ok(TreeHandle::new(tree))
}

/// write (or find) the empty tree
pub fn empty_tree(repo: &Repository) -> StorageResult<TreeId> {
    let builder = repo.treebuilder(None)?;
    Ok(TreeId::new(builder.write()?))
}

/// build a tree from a flat path → object mapping
pub fn build_tree(
    repo: &Repository,
    entries: impl IntoIterator<Item = (ObjectPath, BlobId)>,
) -> StorageResult<TreeId> {
    let mut mutator = TreeMutator::empty(repo);
    for (path, blob) in entries {
        mutator.upsert(&path, blob)?;
    }
    mutator.write()
}

/// pending edits for one directory level
#[derive(Debug, Default)]
struct DirEdit {
    /// start from an empty directory instead of the base tree's one
    replace_base: bool,
    children: BTreeMap<String, Edit>,
}

#[derive(Debug)]
enum Edit {
    Put(Oid),
    Remove,
    Dir(DirEdit),
}

/// a mutable tree builder for making changes
///
/// this adds up changes and produces a new tree when its final
/// the original tree is not modified
///
/// # Usage Pattern
///
/// ```ignore
/// let mut mutator = TreeMutator::from_tree(repo, base_tree_id);
/// mutator.upsert(&path, blob_id)?;
/// mutator.remove(&other_path)?;
/// let new_tree_id = mutator.write()?;
/// ```
pub struct TreeMutator<'repo> {
    repo: &'repo Repository,
    base: Option<TreeId>,
    root: DirEdit,
}

impl<'repo> TreeMutator<'repo> {
    /// start from an existing tree
    pub fn from_tree(repo: &'repo Repository, base: TreeId) -> Self {
        Self {
            repo,
            base: Some(base),
            root: DirEdit::default(),
        }
    }

    /// start from an empty tree
    pub fn empty(repo: &'repo Repository) -> Self {
        Self {
            repo,
            base: None,
            root: DirEdit::default(),
        }
    }

    /// what the path resolves to once pending edits are applied
    pub fn effective_kind(&self, path: &ObjectPath) -> StorageResult<Option<EntryKind>> {
        let segments: Vec<&str> = path.segments().collect();
        self.kind_at(&segments)
    }

    fn kind_at(&self, segments: &[&str]) -> StorageResult<Option<EntryKind>> {
        let mut dir = &self.root;
        let mut base_applies = !dir.replace_base;

        for (i, segment) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            match dir.children.get(*segment) {
                Some(Edit::Put(_)) => return Ok(last.then_some(EntryKind::Blob)),
                Some(Edit::Remove) => return Ok(None),
                Some(Edit::Dir(sub)) => {
                    if last {
                        return Ok(Some(EntryKind::Tree));
                    }
                    base_applies &= !sub.replace_base;
                    dir = sub;
                }
                None => {
                    if !base_applies {
                        return Ok(None);
                    }
                    return self.base_kind(segments);
                }
            }
        }

        Ok(Some(EntryKind::Tree))
    }

    fn base_kind(&self, segments: &[&str]) -> StorageResult<Option<EntryKind>> {
        let Some(base) = self.base else {
            return Ok(None);
        };
        let tree = find_tree(self.repo, base)?;
        let path = ObjectPath::from_segments(segments.iter().copied());
        Ok(tree.try_lookup(self.repo, &path)?.map(|e| e.kind))
    }

    /// insert or replace the object at `path`, creating directories as needed
    pub fn upsert(&mut self, path: &ObjectPath, blob: BlobId) -> StorageResult<()> {
        let segments: Vec<&str> = path.segments().collect();
        let (file_name, parents) = segments
            .split_last()
            .ok_or_else(|| StorageError::PathNotFound(path.to_string()))?;

        for depth in 1..=parents.len() {
            if self.kind_at(&segments[..depth])? == Some(EntryKind::Blob) {
                return Err(StorageError::PathConflict {
                    path: path.to_string(),
                    reason: format!("'{}' is a file", segments[..depth].join("/")),
                });
            }
        }
        if self.kind_at(&segments)? == Some(EntryKind::Tree) {
            return Err(StorageError::PathConflict {
                path: path.to_string(),
                reason: "a directory exists at this path".to_string(),
            });
        }

        let mut dir = &mut self.root;
        for segment in parents {
            let slot = dir
                .children
                .entry(segment.to_string())
                .or_insert_with(|| Edit::Dir(DirEdit::default()));
            if let Edit::Remove = slot {
                *slot = Edit::Dir(DirEdit {
                    replace_base: true,
                    children: BTreeMap::new(),
                });
            }
            dir = match slot {
                Edit::Dir(sub) => sub,
                Edit::Put(_) | Edit::Remove => {
                    return Err(StorageError::Internal(format!("unexpected edit at {}", segment)))
                }
            };
        }
        dir.children.insert(file_name.to_string(), Edit::Put(blob.raw()));
        Ok(())
    }

    /// upsert, first clearing any file on the way down or directory at `path`
    pub fn replace(&mut self, path: &ObjectPath, blob: BlobId) -> StorageResult<()> {
        let segments: Vec<&str> = path.segments().collect();
        for depth in 1..segments.len() {
            if self.kind_at(&segments[..depth])? == Some(EntryKind::Blob) {
                self.remove(&ObjectPath::from_segments(segments[..depth].iter().copied()))?;
                break;
            }
        }
        if self.effective_kind(path)? == Some(EntryKind::Tree) {
            self.remove(path)?;
        }
        self.upsert(path, blob)
    }

    /// remove the file or directory at `path`
    pub fn remove(&mut self, path: &ObjectPath) -> StorageResult<()> {
        if self.effective_kind(path)?.is_none() {
            return Err(StorageError::PathNotFound(path.to_string()));
        }

        let segments: Vec<&str> = path.segments().collect();
        let Some((file_name, parents)) = segments.split_last() else {
            return Err(StorageError::PathNotFound(path.to_string()));
        };

        let mut dir = &mut self.root;
        for segment in parents {
            let slot = dir
                .children
                .entry(segment.to_string())
                .or_insert_with(|| Edit::Dir(DirEdit::default()));
            dir = match slot {
                Edit::Dir(sub) => sub,
                // effective_kind said the path exists, so every parent is a directory
                Edit::Put(_) | Edit::Remove => {
                    return Err(StorageError::PathNotFound(path.to_string()))
                }
            };
        }
        dir.children.insert(file_name.to_string(), Edit::Remove);
        Ok(())
    }

    /// write all changes and return the new root tree ID
    ///
    /// sub-trees are written bottom-up; directories left empty are pruned
    pub fn write(self) -> StorageResult<TreeId> {
        let base = self.base.map(|b| b.raw());
        match write_dir(self.repo, base, &self.root)? {
            Some(oid) => Ok(TreeId::new(oid)),
            None => empty_tree(self.repo),
        }
    }
}

fn write_dir(repo: &Repository, base: Option<Oid>, edit: &DirEdit) -> StorageResult<Option<Oid>> {
    let base_tree = match base {
        Some(oid) if !edit.replace_base => Some(repo.find_tree(oid)?),
        _ => None,
    };
    let mut builder = repo.treebuilder(base_tree.as_ref())?;

    for (name, child) in &edit.children {
        let existing = builder.get(name.as_str())?.map(|e| (e.id(), e.kind()));
        match child {
            Edit::Put(oid) => {
                builder
                    .insert(name.as_str(), *oid, FileMode::Blob.into())
                    .map_err(|e| rejected_entry(e, name))?;
            }
            Edit::Remove => {
                if existing.is_some() {
                    builder.remove(name.as_str())?;
                }
            }
            Edit::Dir(sub) => {
                let child_base =
                    existing.and_then(|(id, kind)| (kind == Some(ObjectType::Tree)).then_some(id));
                match write_dir(repo, child_base, sub)? {
                    Some(oid) => {
                        builder
                            .insert(name.as_str(), oid, FileMode::Tree.into())
                            .map_err(|e| rejected_entry(e, name))?;
                    }
                    None => {
                        if existing.is_some() {
                            builder.remove(name.as_str())?;
                        }
                    }
                }
            }
        }
    }

    if builder.len() == 0 {
        return Ok(None);
    }
    Ok(Some(builder.write()?))
}

/// git refuses some entry names outright; those are bad input, not storage failures
fn rejected_entry(err: git2::Error, name: &str) -> StorageError {
    let refused = err.class() == git2::ErrorClass::Tree
        && err.code() == git2::ErrorCode::GenericError
        && err.message().contains("invalid name");
    if refused {
        StorageError::InvalidName(InvalidNameError::InvalidPath(name.to_string()))
    } else {
        StorageError::Git(err)
    }
}
