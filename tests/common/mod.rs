//! Shared fixtures for the integration suite.

#![allow(dead_code)]

use datagit::access::Actor;
use datagit::hub::{CreateRepository, Hub, HubConfig, RepoPath, Revision};
use datagit::storage::{BranchName, CommitInfo, ObjectPath, UserName};
use tempfile::TempDir;

/// a hub in a temp dir with users alice, bob and carol and the repository
/// `alice/data`
pub struct Fixture {
    pub dir: TempDir,
    pub hub: Hub,
    pub alice: Actor,
    pub bob: Actor,
    pub carol: Actor,
    pub repo: RepoPath,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_options(CreateRepository::default())
    }

    pub fn with_options(options: CreateRepository) -> Self {
        let dir = TempDir::new().unwrap();
        let hub = Hub::open(HubConfig::new(dir.path())).unwrap();
        for name in ["alice", "bob", "carol"] {
            hub.create_user(&UserName::new(name).unwrap(), None).unwrap();
        }
        let alice = Actor::user(UserName::new("alice").unwrap());
        let repo = RepoPath::new("alice", "data").unwrap();
        hub.create_repository(&alice, &repo, options).unwrap();

        Self {
            dir,
            hub,
            alice,
            bob: Actor::user(UserName::new("bob").unwrap()),
            carol: Actor::user(UserName::new("carol").unwrap()),
            repo,
        }
    }

    /// stage `files` on `branch` and commit them as alice; `None` deletes
    pub fn commit(
        &self,
        branch: &BranchName,
        files: &[(&str, Option<&str>)],
        message: &str,
    ) -> CommitInfo {
        self.hub.open_wip(&self.alice, &self.repo, branch).unwrap();
        for (p, content) in files {
            match content {
                Some(content) => {
                    self.hub
                        .put_object(&self.alice, &self.repo, branch, &path(p), content.as_bytes())
                        .unwrap();
                }
                None => self.hub.delete_object(&self.alice, &self.repo, branch, &path(p)).unwrap(),
            }
        }
        self.hub.commit_wip(&self.alice, &self.repo, branch, message).unwrap()
    }

    /// bytes at `p` on `branch`
    pub fn read(&self, branch: &BranchName, p: &str) -> Vec<u8> {
        self.hub
            .get_object(&self.alice, &self.repo, &Revision::branch(branch.clone()), &path(p))
            .unwrap()
            .bytes
    }
}

pub fn path(p: &str) -> ObjectPath {
    ObjectPath::new(p).unwrap()
}

pub fn branch(name: &str) -> BranchName {
    BranchName::new(name).unwrap()
}

pub fn main_branch() -> BranchName {
    BranchName::main()
}
