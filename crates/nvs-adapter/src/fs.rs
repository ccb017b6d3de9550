//! Filesystem backend: one file per namespace under a root directory.
//!
//! Payloads are written to a temporary sibling file and renamed into
//! place, so a crash mid-write never leaves a truncated payload behind.
//! File names are the hex encoding of the namespace key, which keeps
//! arbitrary namespaces (slashes, unicode, dots) filesystem-safe without
//! a lossy sanitization scheme.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{AdapterError, AdapterResult};
use crate::traits::{AdapterContext, StorageAdapter};

/// A directory-backed implementation of [`StorageAdapter`].
pub struct FsAdapter {
    root: PathBuf,
}

impl FsAdapter {
    /// Create an adapter rooted at `root`.
    ///
    /// The directory is created on first write, not here, so constructing
    /// an adapter is infallible.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory this adapter persists into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", hex::encode(key.as_bytes())))
    }
}

#[async_trait]
impl StorageAdapter for FsAdapter {
    async fn get(&self, key: &str, _ctx: &AdapterContext) -> AdapterResult<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AdapterError::Read {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn set(&self, key: &str, value: String, _ctx: &AdapterContext) -> AdapterResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(AdapterError::io)?;

        // Write to a temp sibling, then rename into place.
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, value).await.map_err(|e| {
            AdapterError::Write {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            AdapterError::Write {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })?;
        debug!(key, path = %path.display(), "persisted namespace file");
        Ok(())
    }

    async fn remove(&self, key: &str, _ctx: &AdapterContext) -> AdapterResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AdapterError::Remove {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for FsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsAdapter").field("root", &self.root).finish()
    }
}
