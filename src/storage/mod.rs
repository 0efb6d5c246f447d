//! storage layer for datagit
//!
//! this module provides a complete abstraction over git for versioned data.
//! The upper layers (staging, hub) use this API and never reach past it for
//! object, tree or ref handling.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     GitRepository                           │
//! │   (High-level API: refs, history, paths, diff, merge)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    tree     │       │   object    │       │    refs     │
//!  │ (namespace) │       │   (bytes)   │       │ (branches,  │
//!  └─────────────┘       └─────────────┘       │ tags, wips) │
//!         │                                    └─────────────┘
//!         ▼                                           │
//!  ┌─────────────┐       ┌─────────────┐              │
//!  │ diff, merge │──────▶│   commit    │◀─────────────┘
//!  └─────────────┘       │  (history)  │
//!                        └─────────────┘
//!  ```
//!
//! # Usage
//!
//! ```ignore
//! use datagit::storage::{GitRepository, BranchName, RefSpec, Signature};
//!
//! let path = "./repos/alice/data.git";
//! let repo = GitRepository::init(path, &BranchName::main(), &Signature::system())?;
//! let head = repo.resolve(&RefSpec::Branch(BranchName::main()))?;
//! let entries = repo.list_entries(repo.tree_of(head)?, None)?;
//! ```

pub(crate) mod cancel;
pub(crate) mod commit;
pub(crate) mod diff;
mod error;
pub(crate) mod merge;
pub(crate) mod object;
pub(crate) mod refs;
mod repository;
pub(crate) mod tree;
mod types;

// Re-export public API
pub use cancel::CancelToken;
pub use commit::{CommitInfo, HistoryCursor, HistoryPage};
pub use error::{StorageError, StorageResult};
pub use merge::{MergeKind, MergeOutcome, MergeStrategy};
pub use object::ObjectMeta;
pub use refs::{BranchInfo, RefSpec, TagInfo};
pub use repository::GitRepository;
pub use tree::{EntryKind, TreeEntryInfo};
pub use types::{
    BlobId, BranchName, Change, ChangeAction, CommitId, InvalidNameError, ObjectPath, RepoName,
    Signature, TagName, TreeId, UserName,
};

// Re-export for internal use by other modules
pub(crate) use refs::RefManager;
