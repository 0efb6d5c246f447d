//! Diffs between revisions, branch merges and merge requests.

use crate::access::{Actor, Capability};
use crate::hub::api::{Authorized, Hub};
use crate::hub::error::{HubError, HubResult};
use crate::hub::types::{RepoPath, Revision, UpdateMergeRequest};
use crate::registry::{MergeRequest, MergeRequestState, NewMergeRequest};
use crate::storage::merge::merge_message;
use crate::storage::{BranchName, Change, MergeOutcome, MergeStrategy, ObjectPath};

impl Hub {
    /// Changes that turn `base` into `head`, optionally below `path`.
    ///
    /// Either side may be a WIP.
    pub fn diff(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        base: &Revision,
        head: &Revision,
        path: Option<&ObjectPath>,
    ) -> HubResult<Vec<Change>> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        let base_tree = self.revision_tree(&auth, base)?;
        let head_tree = self.revision_tree(&auth, head)?;

        let changes = auth.git.diff(base_tree, head_tree, path)?;
        tracing::debug!(repo = %repo, base = %base, head = %head, changes = changes.len(), "diff");
        Ok(changes)
    }

    /// Merge branch `source` into branch `target`.
    pub fn merge(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        source: &BranchName,
        target: &BranchName,
        message: Option<&str>,
        strategy: MergeStrategy,
    ) -> HubResult<MergeOutcome> {
        let auth = self.authorize(actor, repo, Capability::Merge)?;
        self.merge_authorized(actor, &auth, source, target, message, strategy)
    }

    fn merge_authorized(
        &self,
        actor: &Actor,
        auth: &Authorized,
        source: &BranchName,
        target: &BranchName,
        message: Option<&str>,
        strategy: MergeStrategy,
    ) -> HubResult<MergeOutcome> {
        let message = message.map_or_else(|| merge_message(source, target), str::to_string);
        let committer = self.signature_for(actor);

        let outcome = self.staging().with_branch_lock(&auth.git, target, || {
            auth.git.merge(source, target, &message, &committer, strategy)
        })?;

        tracing::info!(
            repo = %auth.record.full_name(),
            source = %source,
            target = %target,
            commit = %outcome.commit,
            kind = ?outcome.kind,
            "merge"
        );
        Ok(outcome)
    }

    // ==================== Merge Requests ====================

    /// Propose merging `source` into `target`. Both branches must exist.
    pub fn create_merge_request(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        source: &BranchName,
        target: &BranchName,
        title: &str,
        description: Option<&str>,
    ) -> HubResult<MergeRequest> {
        let auth = self.authorize(actor, repo, Capability::WriteData)?;
        let author = actor
            .name()
            .cloned()
            .ok_or_else(|| {
                HubError::BadRequest("anonymous actors cannot open merge requests".to_string())
            })?;
        if source == target {
            return Err(HubError::BadRequest(format!("source and target are both {}", source)));
        }
        auth.git.get_branch(source)?;
        auth.git.get_branch(target)?;

        let request = self.registry().create_merge_request(
            &auth.record.id,
            NewMergeRequest {
                source: source.clone(),
                target: target.clone(),
                title: title.to_string(),
                description: description.map(str::to_string),
                author,
            },
        )?;
        tracing::info!(
            repo = %repo,
            seq = request.seq,
            source = %source,
            target = %target,
            "merge request opened"
        );
        Ok(request)
    }

    pub fn get_merge_request(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        seq: u64,
    ) -> HubResult<MergeRequest> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        Ok(self.registry().get_merge_request(&auth.record.id, seq)?)
    }

    /// Merge requests ordered by sequence number, optionally of one state.
    pub fn list_merge_requests(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        state: Option<MergeRequestState>,
    ) -> HubResult<Vec<MergeRequest>> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;
        Ok(self.registry().list_merge_requests(&auth.record.id, state))
    }

    /// Edit title or description, close or reopen. Merged requests are final.
    pub fn update_merge_request(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        seq: u64,
        update: UpdateMergeRequest,
    ) -> HubResult<MergeRequest> {
        let auth = self.authorize(actor, repo, Capability::WriteData)?;
        let request = self.registry().update_merge_request(&auth.record.id, seq, |mr| {
            if let Some(title) = update.title {
                mr.title = title;
            }
            if let Some(description) = update.description {
                mr.description = Some(description);
            }
            match update.closed {
                Some(true) => mr.state = MergeRequestState::Closed,
                Some(false) => mr.state = MergeRequestState::Open,
                None => {}
            }
        })?;
        tracing::info!(repo = %repo, seq, state = ?request.state, "merge request updated");
        Ok(request)
    }

    /// Merge an open request's source into its target and mark it merged.
    pub fn merge_merge_request(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        seq: u64,
        strategy: MergeStrategy,
    ) -> HubResult<(MergeRequest, MergeOutcome)> {
        let auth = self.authorize(actor, repo, Capability::Merge)?;
        let request = self.registry().get_merge_request(&auth.record.id, seq)?;
        if request.state != MergeRequestState::Open {
            return Err(HubError::BadRequest(format!("merge request {} is not open", seq)));
        }

        let (source, target) = (&request.source, &request.target);
        let message = format!("{}\n\nMerge request #{}", merge_message(source, target), seq);
        let outcome =
            self.merge_authorized(actor, &auth, source, target, Some(&message), strategy)?;

        let request = self.registry().update_merge_request(&auth.record.id, seq, |mr| {
            mr.state = MergeRequestState::Merged;
            mr.merge_commit = Some(outcome.commit);
        })?;
        Ok((request, outcome))
    }
}
