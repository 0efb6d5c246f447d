//! datagit - version control for data repositories, backed by git
//!
//! Each repository is a bare git repository: objects are blobs, directories
//! are trees, every commit is a git commit and branches and tags are git
//! refs. On top of that, each branch can carry a work-in-progress staging
//! area, and a small JSON registry records users, repository settings,
//! members and merge requests.
//!
//! # Example
//!
//! ```no_run
//! use datagit::access::Actor;
//! use datagit::hub::{CreateRepository, Hub, HubConfig, RepoPath, Revision};
//! use datagit::storage::{BranchName, ObjectPath, UserName};
//!
//! let hub = Hub::open(HubConfig::new("./hub")).unwrap();
//! let alice = UserName::new("alice").unwrap();
//! hub.create_user(&alice, None).unwrap();
//!
//! let actor = Actor::user(alice);
//! let repo = RepoPath::new("alice", "weather").unwrap();
//! hub.create_repository(&actor, &repo, CreateRepository::default()).unwrap();
//!
//! let main = BranchName::main();
//! hub.open_wip(&actor, &repo, &main).unwrap();
//! let path = ObjectPath::new("2024/january.csv").unwrap();
//! hub.put_object(&actor, &repo, &main, &path, b"day,temp\n1,3.5\n").unwrap();
//! hub.commit_wip(&actor, &repo, &main, "add january").unwrap();
//!
//! let object = hub.get_object(&actor, &repo, &Revision::branch(main), &path).unwrap();
//! assert_eq!(object.info.size, 15);
//! ```

pub mod access;
pub mod error;
pub mod hub;
pub mod registry;
pub mod staging;
pub mod storage;

pub use error::ErrorKind;
pub use hub::{Hub, HubConfig, HubError, HubResult};
