//! Metadata registry: users, repositories, members and merge requests.
//!
//! Repository content (objects, trees, commits, refs) lives in git; this is
//! everything else the hub needs to find repositories and decide access.

mod error;
mod store;
mod types;

pub use error::{RegistryError, RegistryResult};
pub use store::{NewRepository, Registry};
pub use types::{Member, MergeRequest, MergeRequestState, NewMergeRequest, RepositoryRecord, User};
