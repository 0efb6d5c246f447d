//! The registry store.
//!
//! All metadata lives in one JSON document. Writers copy the current state,
//! apply their change to the copy, persist it with an atomic rename and only
//! then publish it, so readers never observe a state that failed to persist.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use ulid::Ulid;

use crate::access::{Group, Visibility};
use crate::registry::error::{RegistryError, RegistryResult};
use crate::registry::types::{
    Member, MergeRequest, MergeRequestState, NewMergeRequest, RepositoryRecord, User,
};
use crate::storage::{BranchName, RepoName, UserName};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryState {
    users: BTreeMap<UserName, User>,
    /// keyed by repository id
    repositories: BTreeMap<String, RepositoryRecord>,
    members: BTreeMap<String, BTreeMap<UserName, Member>>,
    merge_requests: BTreeMap<String, Vec<MergeRequest>>,
}

impl RegistryState {
    fn repository_mut(&mut self, id: &str) -> RegistryResult<&mut RepositoryRecord> {
        self.repositories
            .get_mut(id)
            .ok_or_else(|| RegistryError::RepositoryNotFound(id.to_string()))
    }
}

/// fields needed to register a repository
#[derive(Debug, Clone)]
pub struct NewRepository {
    pub owner: UserName,
    pub name: RepoName,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub head: BranchName,
    pub creator: UserName,
}

/// Durable metadata for users, repositories, members and merge requests.
///
/// Thread-safe: share it behind an `Arc`.
pub struct Registry {
    /// `None` keeps everything in memory
    path: Option<PathBuf>,
    state: RwLock<RegistryState>,
}

impl Registry {
    /// A registry that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Load the registry at `path`, starting empty if the file is absent.
    pub fn open(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            RegistryState::default()
        };

        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    fn read<T>(&self, f: impl FnOnce(&RegistryState) -> T) -> T {
        f(&self.state.read())
    }

    fn update<T>(
        &self,
        f: impl FnOnce(&mut RegistryState) -> RegistryResult<T>,
    ) -> RegistryResult<T> {
        let mut state = self.state.write();
        let mut next = state.clone();
        let result = f(&mut next)?;
        self.persist(&next)?;
        *state = next;
        Ok(result)
    }

    fn persist(&self, state: &RegistryState) -> RegistryResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, state)?;
        file.flush()?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    // ==================== Users ====================

    pub fn create_user(&self, name: UserName, email: Option<String>) -> RegistryResult<User> {
        self.update(|state| {
            if state.users.contains_key(&name) {
                return Err(RegistryError::UserExists(name.to_string()));
            }
            let user = User {
                name: name.clone(),
                email,
                created_at: Utc::now(),
            };
            state.users.insert(name, user.clone());
            Ok(user)
        })
    }

    pub fn get_user(&self, name: &UserName) -> RegistryResult<User> {
        self.read(|state| state.users.get(name).cloned())
            .ok_or_else(|| RegistryError::UserNotFound(name.to_string()))
    }

    pub fn user_exists(&self, name: &UserName) -> bool {
        self.read(|state| state.users.contains_key(name))
    }

    // ==================== Repositories ====================

    /// Register a repository; owner and name must be unused.
    pub fn insert_repository(&self, new: NewRepository) -> RegistryResult<RepositoryRecord> {
        self.update(|state| {
            if !state.users.contains_key(&new.owner) {
                return Err(RegistryError::UserNotFound(new.owner.to_string()));
            }
            if state.repositories.values().any(|r| r.owner == new.owner && r.name == new.name) {
                return Err(RegistryError::RepositoryExists(format!("{}/{}", new.owner, new.name)));
            }

            let now = Utc::now();
            let record = RepositoryRecord {
                id: Ulid::new().to_string().to_lowercase(),
                owner: new.owner,
                name: new.name,
                description: new.description,
                visibility: new.visibility,
                head: new.head,
                creator: new.creator,
                created_at: now,
                updated_at: now,
            };
            state.repositories.insert(record.id.clone(), record.clone());
            Ok(record)
        })
    }

    pub fn find_repository(&self, owner: &UserName, name: &RepoName) -> Option<RepositoryRecord> {
        self.read(|state| {
            state
                .repositories
                .values()
                .find(|r| &r.owner == owner && &r.name == name)
                .cloned()
        })
    }

    /// Repositories of one owner, or all, ordered by owner then name.
    pub fn list_repositories(&self, owner: Option<&UserName>) -> Vec<RepositoryRecord> {
        let mut repos: Vec<_> = self.read(|state| {
            state
                .repositories
                .values()
                .filter(|r| owner.map_or(true, |o| &r.owner == o))
                .cloned()
                .collect()
        });
        repos.sort_by(|a, b| (&a.owner, &a.name).cmp(&(&b.owner, &b.name)));
        repos
    }

    /// Apply `f` to a repository record and bump its update time.
    pub fn update_repository(
        &self,
        id: &str,
        f: impl FnOnce(&mut RepositoryRecord),
    ) -> RegistryResult<RepositoryRecord> {
        self.update(|state| {
            let record = state.repository_mut(id)?;
            f(record);
            record.updated_at = Utc::now();
            Ok(record.clone())
        })
    }

    /// Forget a repository with its members and merge requests.
    pub fn remove_repository(&self, id: &str) -> RegistryResult<RepositoryRecord> {
        self.update(|state| {
            let record = state
                .repositories
                .remove(id)
                .ok_or_else(|| RegistryError::RepositoryNotFound(id.to_string()))?;
            state.members.remove(id);
            state.merge_requests.remove(id);
            Ok(record)
        })
    }

    // ==================== Members ====================

    pub fn add_member(
        &self,
        repo_id: &str,
        user: UserName,
        group: Group,
    ) -> RegistryResult<Member> {
        self.update(|state| {
            state.repository_mut(repo_id)?;
            if !state.users.contains_key(&user) {
                return Err(RegistryError::UserNotFound(user.to_string()));
            }
            let members = state.members.entry(repo_id.to_string()).or_default();
            if members.contains_key(&user) {
                return Err(RegistryError::MemberExists {
                    repo: repo_id.to_string(),
                    user: user.to_string(),
                });
            }
            let now = Utc::now();
            let member = Member {
                user: user.clone(),
                group,
                created_at: now,
                updated_at: now,
            };
            members.insert(user, member.clone());
            Ok(member)
        })
    }

    pub fn get_member(&self, repo_id: &str, user: &UserName) -> Option<Member> {
        self.read(|state| state.members.get(repo_id).and_then(|m| m.get(user)).cloned())
    }

    pub fn set_member_group(
        &self,
        repo_id: &str,
        user: &UserName,
        group: Group,
    ) -> RegistryResult<Member> {
        self.update(|state| {
            let member = state
                .members
                .get_mut(repo_id)
                .and_then(|m| m.get_mut(user))
                .ok_or_else(|| RegistryError::MemberNotFound {
                    repo: repo_id.to_string(),
                    user: user.to_string(),
                })?;
            member.group = group;
            member.updated_at = Utc::now();
            Ok(member.clone())
        })
    }

    pub fn remove_member(&self, repo_id: &str, user: &UserName) -> RegistryResult<Member> {
        self.update(|state| {
            state
                .members
                .get_mut(repo_id)
                .and_then(|m| m.remove(user))
                .ok_or_else(|| RegistryError::MemberNotFound {
                    repo: repo_id.to_string(),
                    user: user.to_string(),
                })
        })
    }

    /// Members ordered by user name.
    pub fn list_members(&self, repo_id: &str) -> Vec<Member> {
        self.read(|state| {
            state
                .members
                .get(repo_id)
                .map(|m| m.values().cloned().collect())
                .unwrap_or_default()
        })
    }

    // ==================== Merge Requests ====================

    /// Open a merge request with the next sequence number.
    ///
    /// Only one open request may exist per (source, target) pair.
    pub fn create_merge_request(
        &self,
        repo_id: &str,
        new: NewMergeRequest,
    ) -> RegistryResult<MergeRequest> {
        self.update(|state| {
            state.repository_mut(repo_id)?;
            let requests = state.merge_requests.entry(repo_id.to_string()).or_default();

            let duplicate = requests.iter().find(|mr| {
                mr.state == MergeRequestState::Open
                    && mr.source == new.source
                    && mr.target == new.target
            });
            if let Some(open) = duplicate {
                return Err(RegistryError::MergeRequestExists {
                    source_branch: new.source.to_string(),
                    target_branch: new.target.to_string(),
                    seq: open.seq,
                });
            }

            let now = Utc::now();
            let request = MergeRequest {
                seq: requests.iter().map(|mr| mr.seq).max().unwrap_or(0) + 1,
                source: new.source,
                target: new.target,
                title: new.title,
                description: new.description,
                state: MergeRequestState::Open,
                author: new.author,
                created_at: now,
                updated_at: now,
                merge_commit: None,
            };
            requests.push(request.clone());
            Ok(request)
        })
    }

    pub fn get_merge_request(&self, repo_id: &str, seq: u64) -> RegistryResult<MergeRequest> {
        self.read(|state| {
            state
                .merge_requests
                .get(repo_id)
                .and_then(|requests| requests.iter().find(|mr| mr.seq == seq))
                .cloned()
        })
        .ok_or(RegistryError::MergeRequestNotFound(seq))
    }

    /// Merge requests ordered by sequence, optionally filtered by state.
    pub fn list_merge_requests(
        &self,
        repo_id: &str,
        state_filter: Option<MergeRequestState>,
    ) -> Vec<MergeRequest> {
        self.read(|state| {
            state
                .merge_requests
                .get(repo_id)
                .map(|requests| {
                    requests
                        .iter()
                        .filter(|mr| state_filter.map_or(true, |s| mr.state == s))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Apply `f` to a merge request.
    ///
    /// Merged requests are final. A request only becomes open again while no
    /// other open request covers its (source, target) pair.
    pub fn update_merge_request(
        &self,
        repo_id: &str,
        seq: u64,
        f: impl FnOnce(&mut MergeRequest),
    ) -> RegistryResult<MergeRequest> {
        self.update(|state| {
            let requests = state
                .merge_requests
                .get_mut(repo_id)
                .ok_or(RegistryError::MergeRequestNotFound(seq))?;
            let index = requests
                .iter()
                .position(|mr| mr.seq == seq)
                .ok_or(RegistryError::MergeRequestNotFound(seq))?;

            let previous = requests[index].state;
            if previous == MergeRequestState::Merged {
                return Err(RegistryError::MergeRequestMerged(seq));
            }
            f(&mut requests[index]);
            requests[index].updated_at = Utc::now();
            let request = requests[index].clone();

            if request.state == MergeRequestState::Open && previous != MergeRequestState::Open {
                let duplicate = requests.iter().find(|mr| {
                    mr.seq != seq
                        && mr.state == MergeRequestState::Open
                        && mr.source == request.source
                        && mr.target == request.target
                });
                if let Some(open) = duplicate {
                    return Err(RegistryError::MergeRequestExists {
                        source_branch: open.source.to_string(),
                        target_branch: open.target.to_string(),
                        seq: open.seq,
                    });
                }
            }
            Ok(request)
        })
    }
}
