//! The hub: every repository operation, checked against the acting user.
//!
//! ```text
//!   Hub ──authorize──▶ Registry (users, repositories, members, merge requests)
//!    │
//!    ├──▶ StagingManager (WIPs, per-branch locks)
//!    │          │
//!    └──────────┴──▶ GitRepository (objects, trees, commits, refs)
//! ```

mod api;
mod archive;
mod compare;
mod config;
mod error;
mod members;
mod objects;
mod refs;
mod types;

pub use api::Hub;
pub use archive::{Archive, ArchiveEncoder, ArchiveEntry, ArchiveFormat};
pub use config::HubConfig;
pub use error::{HubError, HubResult};
pub use types::{
    CreateRepository, ObjectContent, ObjectInfo, RepoPath, Revision, UpdateMergeRequest,
    UpdateRepository,
};
