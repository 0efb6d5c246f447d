//! Path-addressed objects, read through any revision, and the WIP that
//! stages writes to them.

use crate::access::{Actor, Capability};
use crate::hub::api::Hub;
use crate::hub::error::{HubError, HubResult};
use crate::hub::types::{ObjectContent, ObjectInfo, RepoPath, Revision};
use crate::staging::{Wip, WipStatus};
use crate::storage::{BlobId, BranchName, Change, CommitInfo, ObjectPath, TreeEntryInfo, TreeId};

impl Hub {
    // ==================== Reads ====================

    /// Entries directly under `prefix` (the root when `None`), sorted by name.
    pub fn list_objects(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        revision: &Revision,
        prefix: Option<&ObjectPath>,
    ) -> HubResult<Vec<TreeEntryInfo>> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        let tree = self.revision_tree(&auth, revision)?;
        Ok(auth.git.list_entries(tree, prefix)?)
    }

    pub fn stat_object(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        revision: &Revision,
        path: &ObjectPath,
    ) -> HubResult<ObjectInfo> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        let tree = self.revision_tree(&auth, revision)?;
        let meta = auth.git.stat_path(tree, path)?;
        Ok(ObjectInfo::new(path.clone(), meta))
    }

    pub fn get_object(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        revision: &Revision,
        path: &ObjectPath,
    ) -> HubResult<ObjectContent> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        let tree = self.revision_tree(&auth, revision)?;
        let (meta, bytes) = auth.git.read_path(tree, path)?;

        tracing::debug!(
            repo = %repo,
            revision = %revision,
            path = %path,
            size = meta.size,
            "object read"
        );
        Ok(ObjectContent {
            info: ObjectInfo::new(path.clone(), meta),
            bytes,
        })
    }

    /// Whether an object with this content hash is stored in the repository.
    pub fn object_exists(&self, actor: &Actor, repo: &RepoPath, hash: BlobId) -> HubResult<bool> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        Ok(auth.git.object_exists(hash)?)
    }

    /// Store the tree for a flat path → object listing of already stored
    /// objects. Identical listings always yield the same tree.
    pub fn build_tree(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        entries: Vec<(ObjectPath, BlobId)>,
    ) -> HubResult<TreeId> {
        let auth = self.authorize(actor, repo, Capability::WriteData)?;
        let count = entries.len();
        let tree = auth.git.build_tree(entries)?;
        tracing::debug!(repo = %repo, tree = %tree, entries = count, "tree built");
        Ok(tree)
    }

    // ==================== WIP ====================

    /// The WIP of `branch`, opened from the branch head when absent.
    pub fn open_wip(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        branch: &BranchName,
    ) -> HubResult<(Wip, WipStatus)> {
        let auth = self.authorize(actor, repo, Capability::WriteData)?;
        let creator = actor
            .name()
            .map(|name| name.to_string())
            .ok_or_else(|| {
                HubError::BadRequest("anonymous actors cannot stage changes".to_string())
            })?;
        Ok(self.staging().open(&auth.git, branch, &creator)?)
    }

    pub fn get_wip(&self, actor: &Actor, repo: &RepoPath, branch: &BranchName) -> HubResult<Wip> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        Ok(self.staging().get(&auth.git, branch)?)
    }

    /// All live WIPs, ordered by branch.
    pub fn list_wips(&self, actor: &Actor, repo: &RepoPath) -> HubResult<Vec<Wip>> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        Ok(self.staging().list(&auth.git)?)
    }

    /// Stage `bytes` at `path` in the branch's WIP.
    pub fn put_object(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        branch: &BranchName,
        path: &ObjectPath,
        bytes: &[u8],
    ) -> HubResult<ObjectInfo> {
        let auth = self.authorize(actor, repo, Capability::WriteData)?;
        let meta = self.staging().put_object(&auth.git, branch, path, bytes)?;
        Ok(ObjectInfo::new(path.clone(), meta))
    }

    /// Stage the removal of the file at `path`.
    pub fn delete_object(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        branch: &BranchName,
        path: &ObjectPath,
    ) -> HubResult<()> {
        let auth = self.authorize(actor, repo, Capability::WriteData)?;
        Ok(self.staging().delete_object(&auth.git, branch, path)?)
    }

    /// What committing the WIP would change, optionally below `path`.
    pub fn wip_changes(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        branch: &BranchName,
        path: Option<&ObjectPath>,
    ) -> HubResult<Vec<Change>> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        Ok(self.staging().changes(&auth.git, branch, path)?)
    }

    /// Commit the branch's WIP as the actor.
    pub fn commit_wip(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        branch: &BranchName,
        message: &str,
    ) -> HubResult<CommitInfo> {
        let auth = self.authorize(actor, repo, Capability::WriteData)?;
        let committer = self.signature_for(actor);
        let info = self.staging().commit(&auth.git, branch, message, &committer)?;

        tracing::info!(repo = %repo, branch = %branch, commit = %info.id, "commit");
        Ok(info)
    }

    pub fn discard_wip(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        branch: &BranchName,
    ) -> HubResult<()> {
        let auth = self.authorize(actor, repo, Capability::WriteData)?;
        Ok(self.staging().discard(&auth.git, branch)?)
    }
}
