//! Repository membership.

use crate::access::{Actor, Capability, Group};
use crate::hub::api::Hub;
use crate::hub::error::{HubError, HubResult};
use crate::hub::types::RepoPath;
use crate::registry::Member;
use crate::storage::UserName;

impl Hub {
    /// Grant `user` a group on the repository.
    ///
    /// The owner already holds Admin and cannot be invited, nor can the
    /// inviting actor invite themselves.
    pub fn invite_member(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        user: &UserName,
        group: Group,
    ) -> HubResult<Member> {
        let auth = self.authorize(actor, repo, Capability::ManageMembers)?;
        if user == &auth.record.owner {
            return Err(HubError::BadRequest(format!("{} owns {}", user, repo)));
        }
        if actor.name() == Some(user) {
            return Err(HubError::BadRequest("cannot invite yourself".to_string()));
        }
        if !self.registry().user_exists(user) {
            return Err(HubError::NotFound(user.to_string()));
        }

        let member = self.registry().add_member(&auth.record.id, user.clone(), group)?;
        tracing::info!(repo = %repo, user = %user, group = %group, "member invited");
        Ok(member)
    }

    pub fn update_member_group(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        user: &UserName,
        group: Group,
    ) -> HubResult<Member> {
        let auth = self.authorize(actor, repo, Capability::ManageMembers)?;
        let member = self.registry().set_member_group(&auth.record.id, user, group)?;
        tracing::info!(repo = %repo, user = %user, group = %group, "member group changed");
        Ok(member)
    }

    pub fn revoke_member(&self, actor: &Actor, repo: &RepoPath, user: &UserName) -> HubResult<()> {
        let auth = self.authorize(actor, repo, Capability::ManageMembers)?;
        self.registry().remove_member(&auth.record.id, user)?;
        tracing::info!(repo = %repo, user = %user, "member revoked");
        Ok(())
    }

    /// Members ordered by user name. The owner is implicit and not listed.
    pub fn list_members(&self, actor: &Actor, repo: &RepoPath) -> HubResult<Vec<Member>> {
        let auth = self.authorize(actor, repo, Capability::ManageMembers)?;
        Ok(self.registry().list_members(&auth.record.id))
    }
}
