//! Staging areas ("work in progress") for datagit.
//!
//! Each branch of a repository has at most one WIP: a mutable working tree
//! seeded from the branch head. Edits accumulate in the WIP until it is
//! committed onto the branch or discarded.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StagingManager                          │
//! │  (open / stage / commit / discard, one lock per branch)     │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                             │
//!                 ▼                             ▼
//!          ┌─────────────┐               ┌─────────────┐
//!          │     Wip     │               │ KeyedLocks  │
//!          │ (snapshot   │               │ (per repo + │
//!          │  commit)    │               │   branch)   │
//!          └─────────────┘               └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use datagit::staging::StagingManager;
//!
//! let staging = StagingManager::new();
//! let (wip, status) = staging.open(&repo, &branch, "alice")?;
//! staging.put_object(&repo, &branch, &ObjectPath::new("data/a.csv")?, b"1,2")?;
//! let commit = staging.commit(&repo, &branch, "add a.csv", &signature)?;
//! ```

mod locks;
mod manager;
mod wip;

pub use locks::KeyedLocks;
pub use manager::StagingManager;
pub use wip::{Wip, WipStatus};
