//! Access control.
//!
//! Every repository operation resolves the actor's effective group on the
//! repository and checks it against the capability the operation needs.
//! Existence is checked by the caller before this module is consulted, so a
//! missing repository is always reported as not found whoever asks.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::storage::UserName;

/// who is calling
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "name")]
pub enum Actor {
    Anonymous,
    User(UserName),
}

impl Actor {
    pub fn user(name: UserName) -> Self {
        Actor::User(name)
    }

    pub fn name(&self) -> Option<&UserName> {
        match self {
            Actor::Anonymous => None,
            Actor::User(name) => Some(name),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Actor::User(_))
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Anonymous => f.write_str("anonymous"),
            Actor::User(name) => write!(f, "{}", name),
        }
    }
}

/// permission tier of a member; later variants include earlier ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Read,
    Write,
    Admin,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Group::Read => "read",
            Group::Write => "write",
            Group::Admin => "admin",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

/// what an operation needs to be allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// list and read refs, commits, objects, diffs and archives
    ReadRepository,
    /// open WIPs, stage edits, commit
    WriteData,
    /// create and delete branches and tags
    ManageRefs,
    /// merge branches and manage merge requests
    Merge,
    /// invite, regroup and revoke members
    ManageMembers,
    /// change description, visibility or default branch
    ManageSettings,
    DeleteRepository,
}

impl Capability {
    /// the lowest group granting this capability
    pub fn required_group(self) -> Group {
        match self {
            Capability::ReadRepository => Group::Read,
            Capability::WriteData | Capability::ManageRefs | Capability::Merge => Group::Write,
            Capability::ManageMembers
            | Capability::ManageSettings
            | Capability::DeleteRepository => Group::Admin,
        }
    }
}

/// the facts about one repository that decide access
#[derive(Debug, Clone, Copy)]
pub struct RepoAccess<'a> {
    pub owner: &'a UserName,
    pub visibility: Visibility,
    /// the actor's membership group, if any
    pub member_group: Option<Group>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    /// the actor lacks the group an operation needs
    #[error("{actor} is not allowed to {capability:?}")]
    Unauthorized { actor: String, capability: Capability },

    /// the action is never allowed for this actor
    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl AccessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::Unauthorized { .. } => ErrorKind::Unauthorized,
            AccessError::Forbidden(_) => ErrorKind::Forbidden,
        }
    }
}

/// the group the actor effectively holds on a repository
///
/// the owner is always admin; public repositories grant everyone read
pub fn effective_group(actor: &Actor, repo: &RepoAccess<'_>) -> Option<Group> {
    let membership = match actor {
        Actor::User(name) if name == repo.owner => Some(Group::Admin),
        Actor::User(_) => repo.member_group,
        Actor::Anonymous => None,
    };
    let public = (repo.visibility == Visibility::Public).then_some(Group::Read);
    membership.max(public)
}

/// check that `actor` holds `capability` on a repository, returning its group
pub fn authorize(
    actor: &Actor,
    repo: &RepoAccess<'_>,
    capability: Capability,
) -> Result<Group, AccessError> {
    match effective_group(actor, repo) {
        Some(group) if group >= capability.required_group() => Ok(group),
        _ => {
            tracing::debug!(actor = %actor, owner = %repo.owner, ?capability, "access denied");
            Err(AccessError::Unauthorized {
                actor: actor.to_string(),
                capability,
            })
        }
    }
}

/// check that `actor` may create repositories under `owner`'s namespace
pub fn authorize_namespace(actor: &Actor, owner: &UserName) -> Result<(), AccessError> {
    match actor {
        Actor::User(name) if name == owner => Ok(()),
        Actor::User(name) => Err(AccessError::Forbidden(format!(
            "{} cannot create repositories for {}",
            name, owner
        ))),
        Actor::Anonymous => Err(AccessError::Unauthorized {
            actor: actor.to_string(),
            capability: Capability::WriteData,
        }),
    }
}
