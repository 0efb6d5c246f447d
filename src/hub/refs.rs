//! Branches, tags and commit history.

use crate::access::{Actor, Capability};
use crate::hub::api::{Authorized, Hub};
use crate::hub::error::{HubError, HubResult};
use crate::hub::types::{RepoPath, Revision};
use crate::storage::{
    BranchInfo, BranchName, CancelToken, CommitId, CommitInfo, GitRepository, HistoryCursor,
    HistoryPage, RefSpec, TagInfo, TagName, TreeId,
};

impl Hub {
    // ==================== Branches ====================

    /// Create `branch` at the commit `source` resolves to.
    pub fn create_branch(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        branch: &BranchName,
        source: &Revision,
    ) -> HubResult<BranchInfo> {
        let auth = self.authorize(actor, repo, Capability::ManageRefs)?;
        let spec = match source {
            Revision::Ref(spec) => spec.clone(),
            Revision::Name(name) => RefSpec::Commit(auth.git.resolve_name(name)?),
            Revision::Wip(_) => {
                return Err(HubError::BadRequest("a branch cannot start from a wip".to_string()))
            }
        };

        let info = auth.git.create_branch(branch, &spec)?;
        tracing::info!(repo = %repo, branch = %branch, commit = %info.commit, "branch created");
        Ok(info)
    }

    pub fn get_branch(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        branch: &BranchName,
    ) -> HubResult<BranchInfo> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        Ok(auth.git.get_branch(branch)?)
    }

    /// All branches, ordered by name.
    pub fn list_branches(&self, actor: &Actor, repo: &RepoPath) -> HubResult<Vec<BranchInfo>> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        Ok(auth.git.list_branches()?)
    }

    /// Delete a branch together with its WIP. The default branch stays.
    pub fn delete_branch(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        branch: &BranchName,
    ) -> HubResult<()> {
        let auth = self.authorize(actor, repo, Capability::ManageRefs)?;
        self.staging().with_branch_lock(&auth.git, branch, || {
            auth.git.delete_branch(branch, &auth.record.head)
        })?;

        tracing::info!(repo = %repo, branch = %branch, "branch deleted");
        Ok(())
    }

    // ==================== Tags ====================

    /// Create an annotated tag at the commit `target` resolves to.
    pub fn create_tag(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        tag: &TagName,
        target: &Revision,
        message: &str,
    ) -> HubResult<TagInfo> {
        let auth = self.authorize(actor, repo, Capability::ManageRefs)?;
        let commit = resolve_commit(&auth.git, target)?;
        let spec = RefSpec::Commit(commit);

        let info = auth.git.create_tag(tag, &spec, message, &self.signature_for(actor))?;
        tracing::info!(repo = %repo, tag = %tag, commit = %info.target, "tag created");
        Ok(info)
    }

    pub fn get_tag(&self, actor: &Actor, repo: &RepoPath, tag: &TagName) -> HubResult<TagInfo> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        Ok(auth.git.get_tag(tag)?)
    }

    pub fn list_tags(&self, actor: &Actor, repo: &RepoPath) -> HubResult<Vec<TagInfo>> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        Ok(auth.git.list_tags()?)
    }

    pub fn delete_tag(&self, actor: &Actor, repo: &RepoPath, tag: &TagName) -> HubResult<()> {
        let auth = self.authorize(actor, repo, Capability::ManageRefs)?;
        auth.git.delete_tag(tag)?;
        tracing::info!(repo = %repo, tag = %tag, "tag deleted");
        Ok(())
    }

    // ==================== Commits ====================

    pub fn get_commit(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        id: CommitId,
    ) -> HubResult<CommitInfo> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        Ok(auth.git.get_commit(id)?)
    }

    /// A page of history reachable from `revision`, newest first.
    ///
    /// `after` is the `next` cursor of the previous page. `limit` defaults to
    /// and is capped at the configured page limit. A WIP revision lists the
    /// history of its base commit.
    pub fn list_commits(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        revision: &Revision,
        after: Option<&str>,
        limit: Option<usize>,
        cancel: &CancelToken,
    ) -> HubResult<HistoryPage> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;

        let cursor = after
            .map(|s| s.parse::<HistoryCursor>())
            .transpose()
            .map_err(|e| HubError::BadRequest(format!("invalid cursor: {}", e)))?;
        let max = self.config().history_page_limit;
        let limit = match limit {
            Some(0) => return Err(HubError::BadRequest("limit must be positive".to_string())),
            Some(n) => n.min(max),
            None => max,
        };

        let start = match revision {
            Revision::Wip(branch) => self.staging().get(&auth.git, branch)?.base,
            other => resolve_commit(&auth.git, other)?,
        };
        tracing::debug!(repo = %repo, start = %start, limit, "listing commits");
        Ok(auth.git.history_page(start, cursor, limit, cancel)?)
    }

    /// The tree a revision reads from: a commit's tree or a WIP's working tree.
    pub(crate) fn revision_tree(
        &self,
        auth: &Authorized,
        revision: &Revision,
    ) -> HubResult<TreeId> {
        match revision {
            Revision::Wip(branch) => Ok(self.staging().get(&auth.git, branch)?.tree),
            other => Ok(auth.git.tree_of(resolve_commit(&auth.git, other)?)?),
        }
    }
}

/// The commit a non-WIP revision names.
pub(crate) fn resolve_commit(git: &GitRepository, revision: &Revision) -> HubResult<CommitId> {
    match revision {
        Revision::Ref(spec) => Ok(git.resolve(spec)?),
        Revision::Name(name) => Ok(git.resolve_name(name)?),
        Revision::Wip(branch) => {
            Err(HubError::BadRequest(format!("wip of {} is not a commit", branch)))
        }
    }
}
