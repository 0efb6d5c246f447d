//! Tree comparison.
//!
//! Both trees are walked at once, level by level, over name-sorted entries.
//! Sub-trees with equal hashes are skipped without being read, so the cost
//! scales with the size of the change rather than the size of the trees.

use std::cmp::Ordering;

use git2::{Oid, Repository};

use crate::storage::error::StorageResult;
use crate::storage::tree::{find_tree, EntryKind, TreeEntryInfo, TreeHandle};
use crate::storage::types::{Change, ChangeAction, ObjectPath, TreeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Node {
    kind: EntryKind,
    oid: Oid,
}

impl From<&TreeEntryInfo> for Node {
    fn from(entry: &TreeEntryInfo) -> Self {
        Self {
            kind: entry.kind,
            oid: entry.oid,
        }
    }
}

/// compute the changes turning `base` into `head`
///
/// a missing tree on either side is treated as empty. With a `filter`, only
/// the entry at that path (and everything below it) is compared; a filter
/// path present in neither tree yields no changes.
///
/// the result is sorted by path and holds at most one change per path
pub fn diff_trees(
    repo: &Repository,
    base: Option<TreeId>,
    head: Option<TreeId>,
    filter: Option<&ObjectPath>,
) -> StorageResult<Vec<Change>> {
    let root = |id: Option<TreeId>| id.map(|id| Node { kind: EntryKind::Tree, oid: id.raw() });

    let (base, head) = match filter {
        None => (root(base), root(head)),
        Some(path) => (node_at(repo, base, path)?, node_at(repo, head, path)?),
    };

    let mut changes = Vec::new();
    diff_nodes(repo, filter, base, head, &mut changes)?;
    Ok(changes)
}

fn node_at(
    repo: &Repository,
    tree: Option<TreeId>,
    path: &ObjectPath,
) -> StorageResult<Option<Node>> {
    let Some(tree) = tree else {
        return Ok(None);
    };
    let handle = find_tree(repo, tree)?;
    Ok(handle.try_lookup(repo, path)?.as_ref().map(Node::from))
}

fn diff_nodes(
    repo: &Repository,
    path: Option<&ObjectPath>,
    base: Option<Node>,
    head: Option<Node>,
    out: &mut Vec<Change>,
) -> StorageResult<()> {
    match (base, head) {
        (None, None) => Ok(()),
        (None, Some(head)) => emit_all(repo, path, head, ChangeAction::Added, out),
        (Some(base), None) => emit_all(repo, path, base, ChangeAction::Deleted, out),
        (Some(base), Some(head)) if base == head => Ok(()),
        (Some(base), Some(head)) => match (base.kind, head.kind) {
            (EntryKind::Tree, EntryKind::Tree) => diff_dirs(repo, path, base.oid, head.oid, out),
            (EntryKind::Blob, EntryKind::Blob) => {
                if let Some(path) = path {
                    out.push(Change::new(path.clone(), ChangeAction::Modified));
                }
                Ok(())
            }
            // a file turned into a directory: the file itself sorts first
            (EntryKind::Blob, EntryKind::Tree) => {
                emit_all(repo, path, base, ChangeAction::Deleted, out)?;
                emit_all(repo, path, head, ChangeAction::Added, out)
            }
            (EntryKind::Tree, EntryKind::Blob) => {
                emit_all(repo, path, head, ChangeAction::Added, out)?;
                emit_all(repo, path, base, ChangeAction::Deleted, out)
            }
        },
    }
}

fn diff_dirs(
    repo: &Repository,
    path: Option<&ObjectPath>,
    base: Oid,
    head: Oid,
    out: &mut Vec<Change>,
) -> StorageResult<()> {
    let base_entries = TreeHandle::new(repo.find_tree(base)?).entries();
    let head_entries = TreeHandle::new(repo.find_tree(head)?).entries();

    let mut b = base_entries.iter().peekable();
    let mut h = head_entries.iter().peekable();

    loop {
        let order = match (b.peek(), h.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(be), Some(he)) => be.name.as_bytes().cmp(he.name.as_bytes()),
        };

        let (base_entry, head_entry) = match order {
            Ordering::Less => (b.next(), None),
            Ordering::Greater => (None, h.next()),
            Ordering::Equal => (b.next(), h.next()),
        };
        let name = base_entry.or(head_entry).map(|e| e.name.as_str()).unwrap_or_default();
        let child = ObjectPath::child(path, name);

        let (base_node, head_node) = (base_entry.map(Node::from), head_entry.map(Node::from));
        diff_nodes(repo, Some(&child), base_node, head_node, out)?;
    }

    Ok(())
}

/// report every file at or below `node` with the same action
fn emit_all(
    repo: &Repository,
    path: Option<&ObjectPath>,
    node: Node,
    action: ChangeAction,
    out: &mut Vec<Change>,
) -> StorageResult<()> {
    match node.kind {
        EntryKind::Blob => {
            if let Some(path) = path {
                out.push(Change::new(path.clone(), action));
            }
        }
        EntryKind::Tree => {
            for entry in TreeHandle::new(repo.find_tree(node.oid)?).entries() {
                let child = ObjectPath::child(path, &entry.name);
                emit_all(repo, Some(&child), Node::from(&entry), action, out)?;
            }
        }
    }
    Ok(())
}
