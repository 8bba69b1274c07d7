//! Blob storage behind input and output bindings.
//!
//! Paths are `/`-separated and relative (`input/report.txt`). Both stores reject
//! absolute paths, empty segments, and `..` traversal.

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Prefix of in-progress files written by [`FsBlobStore`]; such files are never listed.
const TEMP_FILE_PREFIX: &str = ".fnhost-";

/// Metadata for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Changes whenever the object's content is replaced.
    pub etag: String,
}

/// Errors raised by blob stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid blob path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("I/O error on '{path}': {source}")]
    Io { path: String, source: std::io::Error },
}

impl StoreError {
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Storage service consulted by the binding resolver and watched by the blob listener.
#[async_trait]
pub trait BlobStore: Send + Sync + fmt::Debug {
    /// Read an object, or `None` when it does not exist.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Create or replace an object.
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// List objects whose path starts with `prefix`, ordered by path.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, StoreError>;
}

/// Validate a relative blob path.
pub fn validate_blob_path(path: &str) -> Result<(), StoreError> {
    if path.is_empty() {
        return Err(StoreError::invalid_path(path, "path is empty"));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(StoreError::invalid_path(path, "path must be relative and '/'-separated"));
    }
    for segment in path.split('/') {
        if segment.is_empty() {
            return Err(StoreError::invalid_path(path, "path contains an empty segment"));
        }
        if segment == "." || segment == ".." {
            return Err(StoreError::invalid_path(path, "path must not contain '.' or '..' segments"));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Vec<u8>,
    modified: DateTime<Utc>,
    version: u64,
}

/// Process-local store used by tests and one-shot invocations.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, StoredBlob>>,
    versions: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_blob_path(path)?;
        Ok(self.blobs.read().await.get(path).map(|blob| blob.bytes.clone()))
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        validate_blob_path(path)?;
        let version = self.versions.fetch_add(1, Ordering::Relaxed) + 1;
        self.blobs.write().await.insert(
            path.to_string(),
            StoredBlob {
                bytes: bytes.to_vec(),
                modified: Utc::now(),
                version,
            },
        );
        debug!(path, size = bytes.len(), "memory store wrote blob");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, StoreError> {
        let blobs = self.blobs.read().await;
        Ok(blobs
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, blob)| BlobEntry {
                path: path.clone(),
                size: blob.bytes.len() as u64,
                modified: blob.modified,
                etag: format!("v{}", blob.version),
            })
            .collect())
    }
}

/// Store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        validate_blob_path(path)?;
        Ok(path.split('/').fold(self.root.clone(), |full, segment| full.join(segment)))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let full_path = self.full_path(path)?;
        match tokio::fs::read(&full_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(StoreError::io(path, error)),
        }
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let full_path = self.full_path(path)?;
        let parent = full_path.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|error| StoreError::io(path, error))?;

        // Write aside and rename so watchers never observe a half-written object.
        let temp_path = parent.join(format!("{TEMP_FILE_PREFIX}{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&temp_path, bytes)
            .await
            .map_err(|error| StoreError::io(path, error))?;
        if let Err(error) = tokio::fs::rename(&temp_path, &full_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StoreError::io(path, error));
        }
        debug!(path, size = bytes.len(), "filesystem store wrote blob");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, StoreError> {
        let mut entries = Vec::new();
        let mut pending: Vec<(PathBuf, String)> = vec![(self.root.clone(), String::new())];

        while let Some((directory, relative)) = pending.pop() {
            let mut reader = match tokio::fs::read_dir(&directory).await {
                Ok(reader) => reader,
                Err(error) if error.kind() == ErrorKind::NotFound => continue,
                Err(error) => return Err(StoreError::io(relative, error)),
            };
            while let Some(entry) = reader
                .next_entry()
                .await
                .map_err(|error| StoreError::io(relative.clone(), error))?
            {
                let file_name = entry.file_name().to_string_lossy().to_string();
                if file_name.starts_with(TEMP_FILE_PREFIX) {
                    continue;
                }
                let child = if relative.is_empty() {
                    file_name
                } else {
                    format!("{relative}/{file_name}")
                };
                let metadata = entry.metadata().await.map_err(|error| StoreError::io(child.clone(), error))?;
                if metadata.is_dir() {
                    pending.push((entry.path(), child));
                    continue;
                }
                if !child.starts_with(prefix) {
                    continue;
                }
                let modified: DateTime<Utc> = metadata.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
                entries.push(BlobEntry {
                    etag: format!("{}-{}", metadata.len(), modified.timestamp_nanos_opt().unwrap_or_default()),
                    path: child,
                    size: metadata.len(),
                    modified,
                });
            }
        }

        entries.sort_by(|left, right| left.path.cmp(&right.path));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_traversal_and_absolute_paths() {
        assert!(validate_blob_path("input/report.txt").is_ok());
        assert!(validate_blob_path("").is_err());
        assert!(validate_blob_path("/etc/passwd").is_err());
        assert!(validate_blob_path("input/../secret").is_err());
        assert!(validate_blob_path("input//report.txt").is_err());
        assert!(validate_blob_path("input\\report.txt").is_err());
    }

    #[tokio::test]
    async fn memory_store_round_trips_and_versions_writes() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.read("input/a.txt").await.unwrap(), None);

        store.write("input/a.txt", b"first").await.unwrap();
        let first = store.list("input/").await.unwrap();
        store.write("input/a.txt", b"second").await.unwrap();
        let second = store.list("input/").await.unwrap();

        assert_eq!(store.read("input/a.txt").await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(first.len(), 1);
        assert_ne!(first[0].etag, second[0].etag);
    }

    #[tokio::test]
    async fn memory_store_lists_by_prefix() {
        let store = MemoryBlobStore::new();
        store.write("input/a", b"1").await.unwrap();
        store.write("output/a", b"2").await.unwrap();

        let listed: Vec<String> = store.list("input/").await.unwrap().into_iter().map(|e| e.path).collect();
        assert_eq!(listed, vec!["input/a".to_string()]);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn fs_store_writes_nested_paths_and_lists_recursively() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp_dir.path());

        store.write("output/nested/report.txt", b"payload").await.unwrap();
        store.write("input/report.txt", &[0u8, 1, 2]).await.unwrap();

        assert_eq!(
            store.read("output/nested/report.txt").await.unwrap(),
            Some(b"payload".to_vec())
        );
        assert_eq!(store.read("output/missing.txt").await.unwrap(), None);

        let listed = store.list("").await.unwrap();
        let paths: Vec<&str> = listed.iter().map(|entry| entry.path.as_str()).collect();
        assert_eq!(paths, vec!["input/report.txt", "output/nested/report.txt"]);
        assert_eq!(listed[0].size, 3);
    }

    #[tokio::test]
    async fn fs_store_lists_nothing_for_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp_dir.path().join("absent"));
        assert!(store.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fs_store_rejects_escaping_paths() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(temp_dir.path());
        let error = store.write("../escape.txt", b"x").await.unwrap_err();
        assert!(matches!(error, StoreError::InvalidPath { .. }));
    }
}
