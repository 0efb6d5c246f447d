//! core type-safe wrappers around git primitives for the storage layer.

use std::cmp::Ordering;
use std::fmt;
use std::fmt::Formatter;

use git2::Oid;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// declares a newtype over a git object id that serializes as lowercase hex
macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) Oid);

        impl $name {
            pub(crate) fn new(oid: Oid) -> Self {
                Self(oid)
            }

            /// raw Oid (for internal use only)
            pub(crate) fn raw(&self) -> Oid {
                self.0
            }

            /// parse from a full 40 character hex string
            pub fn from_hex(hex: &str) -> Result<Self, InvalidNameError> {
                if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(InvalidNameError::InvalidHash(hex.to_string()));
                }
                Oid::from_str(hex)
                    .map(Self)
                    .map_err(|_| InvalidNameError::InvalidHash(hex.to_string()))
            }

            /// lowercase hex form
            pub fn to_hex(&self) -> String {
                self.0.to_string()
            }

            /// short form of the id
            pub fn short(&self) -> String {
                self.0.to_string()[..7].to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let hex = String::deserialize(deserializer)?;
                Self::from_hex(&hex).map_err(serde::de::Error::custom)
            }
        }
    };
}

object_id!(
    /// Commit identifier.
    ///
    /// This makes sure we don't accidentally pass a blob ID where a commit ID
    /// is expected. The inner Oid is only accessible within the crate.
    CommitId
);

object_id!(
    /// Blob (object content) identifier, also used as the ETag of an object.
    BlobId
);

object_id!(
    /// Tree (directory) identifier
    TreeId
);

impl BlobId {
    /// quoted hex, the form used in `ETag` headers
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

/// Checks the shared rules for owner and repository names.
///
/// Valid names:
/// - 1-64 characters
/// - ASCII alphanumerics, underscores, hyphens and dots
/// - Must start with a letter or digit
fn validate_identifier(name: &str, reserved: &[&str]) -> Result<(), InvalidNameError> {
    if name.is_empty() {
        return Err(InvalidNameError::Empty);
    }

    if name.len() > 64 {
        return Err(InvalidNameError::TooLong { len: name.len(), max: 64 });
    }

    let first_char = name.chars().next().unwrap_or_default();
    if !first_char.is_ascii_alphanumeric() {
        return Err(InvalidNameError::InvalidStart(first_char));
    }

    for (i, c) in name.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' && c != '.' {
            return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
        }
    }

    if name.ends_with(".git") || name.contains("..") {
        return Err(InvalidNameError::InvalidPath(name.to_string()));
    }

    if reserved.contains(&name.to_lowercase().as_str()) {
        return Err(InvalidNameError::Reserved(name.to_string()));
    }

    Ok(())
}

/// A validated repository name, unique per owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoName(String);

impl RepoName {
    const RESERVED: &'static [&'static str] = &["repos", "registry"];

    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        validate_identifier(&name, Self::RESERVED)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A validated user name (also the namespace repositories live under).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserName(String);

impl UserName {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        validate_identifier(&name, &[])?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_newtype_impls {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = InvalidNameError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }
    };
}

string_newtype_impls!(RepoName);
string_newtype_impls!(UserName);
string_newtype_impls!(BranchName);
string_newtype_impls!(TagName);

/// checks a short ref name against git's ref-format rules
fn validate_ref_name(prefix: &str, name: &str) -> Result<(), InvalidNameError> {
    if name.is_empty() {
        return Err(InvalidNameError::Empty);
    }
    if name.contains("..") || name.ends_with('/') || name.starts_with('/') {
        return Err(InvalidNameError::InvalidPath(name.to_string()));
    }
    if !git2::Reference::is_valid_name(&format!("{}{}", prefix, name)) {
        return Err(InvalidNameError::InvalidPath(name.to_string()));
    }
    Ok(())
}

/// a branch name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// the default branch name of new repositories
    pub const MAIN: &'static str = "main";

    pub const MAX_LEN: usize = 255;

    const REF_PREFIX: &'static str = "refs/heads/";
    const WIP_PREFIX: &'static str = "refs/wip/";

    /// create a new BranchName
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        if name.len() > Self::MAX_LEN {
            return Err(InvalidNameError::TooLong { len: name.len(), max: Self::MAX_LEN });
        }
        validate_ref_name(Self::REF_PREFIX, &name)?;
        Ok(Self(name))
    }

    /// create the main branch reference
    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    /// get the full ref path (e.g., "refs/heads/main")
    pub fn as_ref_path(&self) -> String {
        format!("{}{}", Self::REF_PREFIX, self.0)
    }

    /// the ref holding this branch's work-in-progress snapshot
    pub fn wip_ref_path(&self) -> String {
        format!("{}{}", Self::WIP_PREFIX, self.0)
    }

    /// recover a branch name from a wip ref path
    pub(crate) fn from_wip_ref_path(path: &str) -> Option<Self> {
        path.strip_prefix(Self::WIP_PREFIX).and_then(|name| Self::new(name).ok())
    }

    /// get the short name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// an immutable tag name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagName(String);

impl TagName {
    /// tags longer than this are rejected
    pub const MAX_LEN: usize = 40;

    const REF_PREFIX: &'static str = "refs/tags/";

    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        if name.len() > Self::MAX_LEN {
            return Err(InvalidNameError::TooLong { len: name.len(), max: Self::MAX_LEN });
        }
        validate_ref_name(Self::REF_PREFIX, &name)?;
        Ok(Self(name))
    }

    pub fn as_ref_path(&self) -> String {
        format!("{}{}", Self::REF_PREFIX, self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A validated, normalized object path inside a tree.
///
/// Format: `dir/sub/file.ext`, no leading slash, no empty, `.` or `..`
/// segments. A single leading `/` in the input is accepted and stripped.
/// Paths order segment by segment, which is the order trees are walked in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath(String);

impl ObjectPath {
    pub const MAX_LEN: usize = 4096;

    pub fn new(path: impl AsRef<str>) -> Result<Self, InvalidNameError> {
        let raw = path.as_ref();
        let path = raw.strip_prefix('/').unwrap_or(raw);

        if path.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if path.len() > Self::MAX_LEN {
            return Err(InvalidNameError::TooLong { len: path.len(), max: Self::MAX_LEN });
        }
        if let Some(position) = path.find('\0') {
            return Err(InvalidNameError::InvalidCharacter { char: '\0', position });
        }
        let bad_segment =
            |seg: &str| seg.is_empty() || seg == "." || seg == ".." || is_git_dir_alias(seg);
        if path.split('/').any(bad_segment) {
            return Err(InvalidNameError::InvalidPath(raw.to_string()));
        }

        Ok(Self(path.to_string()))
    }

    /// parse an optional directory prefix; `""` and `"/"` mean the root
    pub fn prefix(prefix: &str) -> Result<Option<Self>, InvalidNameError> {
        let trimmed = prefix.trim_end_matches('/');
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Self::new(trimmed).map(Some)
        }
    }

    pub(crate) fn from_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> Self {
        Self(segments.into_iter().collect::<Vec<_>>().join("/"))
    }

    /// append a single entry name
    pub(crate) fn child(parent: Option<&ObjectPath>, name: &str) -> Self {
        match parent {
            Some(p) => Self(format!("{}/{}", p.0, name)),
            None => Self(name.to_string()),
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.split('/')
    }

    /// last segment
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn parent(&self) -> Option<ObjectPath> {
        self.0.rsplit_once('/').map(|(parent, _)| Self(parent.to_string()))
    }

    /// whether `self` equals `other` or lies below it
    pub fn starts_with(&self, other: &ObjectPath) -> bool {
        match self.0.strip_prefix(other.0.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// whether git refuses `segment` as a tree entry because it could stand for
/// the `.git` directory: any case, NTFS trailing dots, spaces and stream
/// suffixes, the 8.3 short names, and HFS+ ignorable code points
fn is_git_dir_alias(segment: &str) -> bool {
    let visible: String = segment.chars().filter(|c| !is_hfs_ignorable(*c)).collect();
    let stem = visible.split(':').next().unwrap_or_default();
    let stem = stem.trim_end_matches(['.', ' ']).to_ascii_lowercase();
    matches!(stem.as_str(), ".git" | "git~1" | "git~2" | "git~3" | "git~4")
}

fn is_hfs_ignorable(c: char) -> bool {
    matches!(
        c,
        '\u{200c}'..='\u{200f}' | '\u{202a}'..='\u{202e}' | '\u{206a}'..='\u{206f}' | '\u{feff}'
    )
}

impl Ord for ObjectPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments().cmp(other.segments())
    }
}

impl PartialOrd for ObjectPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectPath> for String {
    fn from(value: ObjectPath) -> String {
        value.0
    }
}

/// committer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    /// create a new signature
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// signature used for commits the system makes on its own behalf
    pub fn system() -> Self {
        Self::new("datagit", "datagit@localhost")
    }

    /// convert to git2::Signature stamped with the current time
    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::system()
    }
}

/// error type for invalid names (repositories, users, refs, paths, hashes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong { len: usize, max: usize },
    InvalidStart(char),
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
    InvalidPath(String),
    InvalidHash(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong { len, max } => {
                write!(f, "name too long: {} characters (max {})", len, max)
            }
            Self::InvalidStart(c) => write!(f, "name cannot start with '{}'", c),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character {:?} at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is a reserved name", name),
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
            Self::InvalidHash(hash) => write!(f, "invalid hash: '{}'", hash),
        }
    }
}

impl std::error::Error for InvalidNameError {}

/// represents a change between two trees
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: ObjectPath,
    pub action: ChangeAction,
}

impl Change {
    pub fn new(path: ObjectPath, action: ChangeAction) -> Self {
        Self { path, action }
    }
}

/// the type of change in a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Added,
    Deleted,
    Modified,
}
