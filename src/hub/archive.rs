//! Archives of a revision's files.
//!
//! The hub supplies the ordered `(path, bytes)` listing of a resolved
//! revision; turning it into zip or car bytes is the job of an
//! [`ArchiveEncoder`] handed in by the caller.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::access::{Actor, Capability};
use crate::hub::api::Hub;
use crate::hub::error::HubResult;
use crate::hub::refs::resolve_commit;
use crate::hub::types::{RepoPath, Revision};
use crate::storage::{CancelToken, CommitId, ObjectPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Zip,
    Car,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Car => "car",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// one file of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: ObjectPath,
    pub bytes: Vec<u8>,
}

/// Turns an ordered file listing into archive bytes.
pub trait ArchiveEncoder {
    fn encode(&self, format: ArchiveFormat, entries: Vec<ArchiveEntry>) -> std::io::Result<Vec<u8>>;
}

/// an encoded archive
#[derive(Debug, Clone)]
pub struct Archive {
    pub file_name: String,
    pub format: ArchiveFormat,
    /// the commit archived, absent for a WIP
    pub commit: Option<CommitId>,
    pub content_length: u64,
    pub bytes: Vec<u8>,
}

impl Hub {
    /// Encode every file of `revision`, in path order.
    ///
    /// `cancel` is checked between object reads; a cancelled archive leaves
    /// nothing behind.
    pub fn get_archive(
        &self,
        actor: &Actor,
        repo: &RepoPath,
        revision: &Revision,
        format: ArchiveFormat,
        encoder: &dyn ArchiveEncoder,
        cancel: &CancelToken,
    ) -> HubResult<Archive> {
        let auth = self.authorize(actor, repo, Capability::ReadRepository)?;

        let (commit, label, files) = match revision {
            Revision::Wip(branch) => (
                None,
                format!("{}-wip", branch),
                self.staging().read_all(&auth.git, branch, cancel)?,
            ),
            other => {
                let commit = resolve_commit(&auth.git, other)?;
                let tree = auth.git.tree_of(commit)?;
                (Some(commit), commit.short(), auth.git.read_all(tree, cancel)?)
            }
        };
        let entries: Vec<ArchiveEntry> = files
            .into_iter()
            .map(|(path, bytes)| ArchiveEntry { path, bytes })
            .collect();
        let file_count = entries.len();

        cancel.check()?;
        let bytes = encoder.encode(format, entries)?;

        let label = label.replace('/', "-");
        let archive = Archive {
            file_name: format!("{}-{}.{}", auth.record.name, label, format.extension()),
            format,
            commit,
            content_length: bytes.len() as u64,
            bytes,
        };

        tracing::debug!(
            repo = %repo,
            revision = %revision,
            files = file_count,
            size = archive.content_length,
            "archive generated"
        );
        Ok(archive)
    }
}
