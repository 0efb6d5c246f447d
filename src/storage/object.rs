//! Content-addressable object storage.
//!
//! Object bytes are written as git blobs. The blob id is a SHA-1 over the
//! content, so writing identical bytes twice yields the same id and a single
//! stored object; the same id doubles as the object's checksum and ETag.

use git2::{ObjectType, Repository};
use serde::Serialize;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::BlobId;

/// write bytes to the object store, returning their content hash
///
/// idempotent: identical content maps onto the existing object
pub fn put_object(repo: &Repository, bytes: &[u8]) -> StorageResult<BlobId> {
    let oid = repo.blob(bytes)?;
    Ok(BlobId::new(oid))
}

/// read an object's bytes
pub fn get_object(repo: &Repository, id: BlobId) -> StorageResult<Vec<u8>> {
    let blob = repo
        .find_blob(id.raw())
        .map_err(|e| {
            StorageError::or_not_found(e, || StorageError::ObjectNotFound(id.to_string()))
        })?;
    Ok(blob.content().to_vec())
}

/// check whether an object with this hash is stored
pub fn object_exists(repo: &Repository, id: BlobId) -> StorageResult<bool> {
    let odb = repo.odb()?;
    if !odb.exists(id.raw()) {
        return Ok(false);
    }
    let (_, kind) = odb.read_header(id.raw())?;
    Ok(kind == ObjectType::Blob)
}

/// metadata about an object without reading its full content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMeta {
    pub id: BlobId,
    pub size: u64,
}

impl ObjectMeta {
    /// hex checksum of the content
    pub fn checksum(&self) -> String {
        self.id.to_hex()
    }
}

/// read an object's size from its header
pub fn stat_object(repo: &Repository, id: BlobId) -> StorageResult<ObjectMeta> {
    let odb = repo.odb()?;
    let (size, kind) = odb
        .read_header(id.raw())
        .map_err(|e| {
            StorageError::or_not_found(e, || StorageError::ObjectNotFound(id.to_string()))
        })?;
    if kind != ObjectType::Blob {
        return Err(StorageError::ObjectNotFound(id.to_string()));
    }
    Ok(ObjectMeta { id, size: size as u64 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_put_is_idempotent() {
        let (_dir, repo) = setup_repo();

        let first = put_object(&repo, b"hello world").unwrap();
        let second = put_object(&repo, b"hello world").unwrap();
        let other = put_object(&repo, b"hello world!").unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn test_get_and_stat() {
        let (_dir, repo) = setup_repo();
        let id = put_object(&repo, b"0123456789").unwrap();

        assert_eq!(get_object(&repo, id).unwrap(), b"0123456789");
        let meta = stat_object(&repo, id).unwrap();
        assert_eq!(meta.size, 10);
        assert_eq!(meta.checksum(), id.to_hex());
        assert_eq!(id.etag(), format!("\"{}\"", id.to_hex()));
    }

    #[test]
    fn test_missing_object() {
        let (_dir, repo) = setup_repo();
        let missing = BlobId::from_hex("1111111111111111111111111111111111111111").unwrap();

        assert!(!object_exists(&repo, missing).unwrap());
        assert!(matches!(get_object(&repo, missing), Err(StorageError::ObjectNotFound(_))));
        assert!(matches!(stat_object(&repo, missing), Err(StorageError::ObjectNotFound(_))));
    }

    #[test]
    fn test_empty_content_is_storable() {
        let (_dir, repo) = setup_repo();
        let id = put_object(&repo, b"").unwrap();
        assert!(object_exists(&repo, id).unwrap());
        assert_eq!(get_object(&repo, id).unwrap(), Vec::<u8>::new());
    }
}
