//! Local disk storage for videos when object storage is unavailable.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Videos stored under a root directory on the worker's disk.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `data` to `relative` under the root, creating parent directories.
    /// Returns the absolute path written.
    pub async fn write(&self, relative: &str, data: &[u8]) -> StorageResult<PathBuf> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        info!("Saved {} bytes to {}", data.len(), path.display());
        Ok(path)
    }

    /// Read a file previously returned by [`write`](Self::write).
    pub async fn read(&self, path: impl AsRef<Path>) -> StorageResult<Vec<u8>> {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a file. Missing files are not an error.
    pub async fn delete(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Deleting {}", path.display());
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(&self, relative: &str) -> StorageResult<PathBuf> {
        let rel = Path::new(relative);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.is_empty() || escapes {
            return Err(StorageError::invalid_key(relative));
        }
        Ok(self.root.join(rel))
    }
}
