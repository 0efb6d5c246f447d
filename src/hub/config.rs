//! Hub configuration.

use std::path::PathBuf;

use crate::storage::BranchName;

/// Hub configuration options.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Directory holding `registry.json` and `repos/`.
    pub root: PathBuf,
    /// Create the root directory if it doesn't exist.
    pub create_if_missing: bool,
    /// Default branch of newly created repositories.
    pub default_branch: BranchName,
    /// Write the registry to disk; otherwise it lives only in memory.
    pub persist_registry: bool,
    /// Domain for committer e-mails of users that have none.
    pub committer_domain: String,
    /// Largest page `list_commits` returns.
    pub history_page_limit: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".datagit"),
            create_if_missing: true,
            default_branch: BranchName::main(),
            persist_registry: true,
            committer_domain: "users.noreply.datagit".to_string(),
            history_page_limit: 100,
        }
    }
}

impl HubConfig {
    /// Create a new configuration with the given root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Set the default branch for new repositories.
    pub fn default_branch(mut self, branch: BranchName) -> Self {
        self.default_branch = branch;
        self
    }

    /// Set persist_registry flag.
    pub fn persist_registry(mut self, value: bool) -> Self {
        self.persist_registry = value;
        self
    }

    /// Set the committer e-mail domain.
    pub fn committer_domain(mut self, domain: impl Into<String>) -> Self {
        self.committer_domain = domain.into();
        self
    }

    /// Set the history page limit.
    pub fn history_page_limit(mut self, limit: usize) -> Self {
        self.history_page_limit = limit;
        self
    }

    pub(crate) fn registry_path(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    pub(crate) fn repos_dir(&self) -> PathBuf {
        self.root.join("repos")
    }
}
