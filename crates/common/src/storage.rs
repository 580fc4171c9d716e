//! Resource payload storage.
//!
//! The guard treats resource payloads as opaque byte blobs behind this
//! interface; a resource record's `location` is the address the store
//! understands. Reads and writes are positioned so each open descriptor
//! can keep its own cursor.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Errors from the backing store
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no payload at location: {0}")]
    NotFound(String),

    #[error("invalid location: {0}")]
    InvalidLocation(String),
}

/// Byte-blob I/O for resource payloads
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Read up to `len` bytes starting at `offset`. Reading past the end
    /// of the payload returns the available prefix (possibly empty).
    async fn read_at(&self, location: &str, offset: u64, len: usize)
        -> Result<Vec<u8>, StorageError>;

    /// Write `data` at `offset`, extending the payload as needed. The
    /// payload is created on first write.
    async fn write_at(&self, location: &str, offset: u64, data: &[u8]) -> Result<(), StorageError>;
}

/// Filesystem-backed store
///
/// Locations are paths resolved under a root directory. Absolute locations
/// are rejected so a resource record cannot address files outside the root.
#[derive(Debug, Clone)]
pub struct FsResourceStore {
    root: PathBuf,
}

impl FsResourceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, location: &str) -> Result<PathBuf, StorageError> {
        let relative = location.trim_start_matches('/');
        if relative.is_empty() || relative.split('/').any(|seg| seg == "..") {
            return Err(StorageError::InvalidLocation(location.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ResourceStore for FsResourceStore {
    async fn read_at(
        &self,
        location: &str,
        offset: u64,
        len: usize,
    ) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(location)?;
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(location.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    async fn write_at(&self, location: &str, offset: u64, data: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(location)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral deployments
#[derive(Debug, Clone, Default)]
pub struct MemoryResourceStore {
    payloads: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn read_at(
        &self,
        location: &str,
        offset: u64,
        len: usize,
    ) -> Result<Vec<u8>, StorageError> {
        let payloads = self.payloads.read().unwrap_or_else(|e| e.into_inner());
        let payload = payloads
            .get(location)
            .ok_or_else(|| StorageError::NotFound(location.to_string()))?;
        let start = (offset as usize).min(payload.len());
        let end = start.saturating_add(len).min(payload.len());
        Ok(payload[start..end].to_vec())
    }

    async fn write_at(&self, location: &str, offset: u64, data: &[u8]) -> Result<(), StorageError> {
        let mut payloads = self.payloads.write().unwrap_or_else(|e| e.into_inner());
        let payload = payloads.entry(location.to_string()).or_default();
        let offset = offset as usize;
        let end = offset + data.len();
        if payload.len() < end {
            payload.resize(end, 0);
        }
        payload[offset..end].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_write_then_read() {
        let store = MemoryResourceStore::new();
        store.write_at("doc1", 0, b"hello").await.unwrap();

        let bytes = store.read_at("doc1", 0, 5).await.unwrap();
        assert_eq!(bytes, b"hello");

        // Reading past the end returns the available prefix
        let bytes = store.read_at("doc1", 3, 10).await.unwrap();
        assert_eq!(bytes, b"lo");
    }

    #[tokio::test]
    async fn test_memory_read_missing_fails() {
        let store = MemoryResourceStore::new();
        assert!(matches!(
            store.read_at("ghost", 0, 1).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fs_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResourceStore::new(dir.path());

        store.write_at("docs/doc1", 0, b"hello").await.unwrap();
        let bytes = store.read_at("docs/doc1", 0, 5).await.unwrap();
        assert_eq!(bytes, b"hello");

        // Positioned write extends the payload
        store.write_at("docs/doc1", 5, b" world").await.unwrap();
        let bytes = store.read_at("docs/doc1", 0, 64).await.unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn test_fs_rejects_escaping_locations() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResourceStore::new(dir.path());
        assert!(matches!(
            store.write_at("../outside", 0, b"x").await,
            Err(StorageError::InvalidLocation(_))
        ));
    }
}
