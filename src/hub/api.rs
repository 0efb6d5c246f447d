//! Hub API - the entry point collaborators call.
//!
//! Every repository operation goes through [`Hub::authorize`]: the owner and
//! repository must exist, then the actor's group must grant the capability
//! the operation needs.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::access::{self, Actor, Capability, RepoAccess};
use crate::hub::config::HubConfig;
use crate::hub::error::{HubError, HubResult};
use crate::hub::types::{CreateRepository, RepoPath, UpdateRepository};
use crate::registry::{NewRepository, Registry, RegistryError, RepositoryRecord, User};
use crate::staging::StagingManager;
use crate::storage::{GitRepository, RepoName, Signature, UserName};

/// The main hub handle.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: HubConfig,
    registry: Registry,
    staging: StagingManager,
    /// serializes repository creation and deletion
    lifecycle_lock: Mutex<()>,
}

/// a repository the actor was allowed into
pub(crate) struct Authorized {
    pub record: RepositoryRecord,
    pub git: GitRepository,
}

impl Hub {
    /// Open or create a hub with the given configuration.
    pub fn open(config: HubConfig) -> HubResult<Self> {
        if !config.root.exists() {
            if !config.create_if_missing {
                let missing = format!("{} does not exist", config.root.display());
                return Err(HubError::InvalidConfig(missing));
            }
            std::fs::create_dir_all(&config.root)?;
        }
        if config.history_page_limit == 0 {
            return Err(HubError::InvalidConfig("history_page_limit must be positive".to_string()));
        }

        let registry = if config.persist_registry {
            Registry::open(config.registry_path())?
        } else {
            Registry::in_memory()
        };
        tracing::info!(root = %config.root.display(), "hub opened");

        Ok(Self {
            inner: Arc::new(HubInner {
                config,
                registry,
                staging: StagingManager::new(),
                lifecycle_lock: Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub(crate) fn staging(&self) -> &StagingManager {
        &self.inner.staging
    }

    fn repo_dir(&self, owner: &UserName, name: &RepoName) -> PathBuf {
        self.inner.config.repos_dir().join(owner.as_str()).join(format!("{}.git", name))
    }

    /// Resolve a repository and check the actor may exercise `capability` on it.
    pub(crate) fn authorize(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        capability: Capability,
    ) -> HubResult<Authorized> {
        let not_found = || HubError::NotFound(repo.to_string());

        if !self.registry().user_exists(&repo.owner) {
            return Err(not_found());
        }
        let record = self
            .registry()
            .find_repository(&repo.owner, &repo.name)
            .ok_or_else(not_found)?;

        let member_group = actor
            .name()
            .and_then(|user| self.registry().get_member(&record.id, user))
            .map(|member| member.group);
        access::authorize(
            actor,
            &RepoAccess {
                owner: &record.owner,
                visibility: record.visibility,
                member_group,
            },
            capability,
        )?;

        let git = GitRepository::open(self.repo_dir(&record.owner, &record.name))?;
        Ok(Authorized { record, git })
    }

    /// The signature commits made by `actor` carry.
    pub(crate) fn signature_for(&self, actor: &Actor) -> Signature {
        match actor {
            Actor::User(name) => {
                let email = self
                    .registry()
                    .get_user(name)
                    .ok()
                    .and_then(|u| u.email)
                    .unwrap_or_else(|| format!("{}@{}", name, self.inner.config.committer_domain));
                Signature::new(name.as_str(), email)
            }
            Actor::Anonymous => Signature::system(),
        }
    }

    // ==================== Users ====================

    /// Record a user. Authentication itself happens elsewhere.
    pub fn create_user(&self, name: &UserName, email: Option<&str>) -> HubResult<User> {
        let user = self.registry().create_user(name.clone(), email.map(str::to_string))?;
        tracing::info!(user = %name, "user created");
        Ok(user)
    }

    pub fn get_user(&self, name: &UserName) -> HubResult<User> {
        Ok(self.registry().get_user(name)?)
    }

    // ==================== Repositories ====================

    /// Create a repository under the actor's own namespace, with its default
    /// branch pointing at an empty initial commit.
    pub fn create_repository(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        options: CreateRepository,
    ) -> HubResult<RepositoryRecord> {
        if !self.registry().user_exists(&repo.owner) {
            return Err(HubError::NotFound(repo.owner.to_string()));
        }
        access::authorize_namespace(actor, &repo.owner)?;

        let _guard = self.inner.lifecycle_lock.lock();
        let dir = self.repo_dir(&repo.owner, &repo.name);
        if self.registry().find_repository(&repo.owner, &repo.name).is_some() || dir.exists() {
            return Err(RegistryError::RepositoryExists(repo.to_string()).into());
        }

        let default_branch = self.inner.config.default_branch.clone();
        let git = GitRepository::init(&dir, &default_branch, &self.signature_for(actor))?;

        let inserted = self.registry().insert_repository(NewRepository {
            owner: repo.owner.clone(),
            name: repo.name.clone(),
            description: options.description,
            visibility: options.visibility,
            head: default_branch,
            creator: repo.owner.clone(),
        });
        let record = match inserted {
            Ok(record) => record,
            Err(e) => {
                git.destroy()?;
                return Err(e.into());
            }
        };

        tracing::info!(repo = %repo, id = %record.id, "repository created");
        Ok(record)
    }

    pub fn get_repository(&self, actor: &Actor, repo: &RepoPath) -> HubResult<RepositoryRecord> {
        Ok(self.authorize(actor, repo, Capability::ReadRepository)?.record)
    }

    /// Repositories the actor can read, optionally of one owner.
    pub fn list_repositories(
        &self,
        actor: &Actor,
        owner: Option<&UserName>,
    ) -> HubResult<Vec<RepositoryRecord>> {
        if let Some(owner) = owner {
            if !self.registry().user_exists(owner) {
                return Err(HubError::NotFound(owner.to_string()));
            }
        }

        let visible = self
            .registry()
            .list_repositories(owner)
            .into_iter()
            .filter(|record| {
                let member_group = actor
                    .name()
                    .and_then(|user| self.registry().get_member(&record.id, user))
                    .map(|member| member.group);
                let facts = RepoAccess {
                    owner: &record.owner,
                    visibility: record.visibility,
                    member_group,
                };
                access::effective_group(actor, &facts).is_some()
            })
            .collect();
        Ok(visible)
    }

    /// Change description, visibility or default branch.
    pub fn update_repository(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        update: UpdateRepository,
    ) -> HubResult<RepositoryRecord> {
        let auth = self.authorize(actor, repo, Capability::ManageSettings)?;

        let new_head = update.head.clone();
        if let Some(head) = &new_head {
            auth.git.set_default_branch(head)?;
        }
        let updated = self.registry().update_repository(&auth.record.id, |record| {
            if let Some(description) = update.description {
                record.description = Some(description);
            }
            if let Some(visibility) = update.visibility {
                record.visibility = visibility;
            }
            if let Some(head) = update.head {
                record.head = head;
            }
        });

        let record = match updated {
            Ok(record) => record,
            Err(e) => {
                // git must keep naming the default branch the registry has
                if new_head.is_some() {
                    if let Err(restore) = auth.git.set_default_branch(&auth.record.head) {
                        tracing::error!(repo = %repo, error = %restore, "failed to restore HEAD");
                    }
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            repo = %repo,
            head = %record.head,
            visibility = ?record.visibility,
            "repository updated"
        );
        Ok(record)
    }

    /// Delete a repository with its refs, WIPs, objects, members and merge requests.
    pub fn delete_repository(&self, actor: &Actor, repo: &RepoPath) -> HubResult<()> {
        let auth = self.authorize(actor, repo, Capability::DeleteRepository)?;

        let _guard = self.inner.lifecycle_lock.lock();
        self.registry().remove_repository(&auth.record.id)?;
        auth.git.destroy()?;

        tracing::info!(repo = %repo, "repository deleted");
        Ok(())
    }
}
