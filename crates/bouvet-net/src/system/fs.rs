//! Filesystem access used by the network manager.

use crate::error::{NetError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Whole-file filesystem operations.
///
/// Implemented by [`OsFileSystem`] for the guest and by
/// `FakeFileSystem` in tests.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file as UTF-8. A missing file reads as the empty string.
    async fn read_file_string(&self, path: &Path) -> Result<String>;

    /// Replace the contents of a file, creating parent directories if needed.
    async fn write_file_string(&self, path: &Path, content: &str) -> Result<()>;

    /// Returns true if `path` exists.
    async fn file_exists(&self, path: &Path) -> bool;

    /// Expand a glob pattern into the matching paths, sorted.
    async fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>>;
}

/// [`FileSystem`] backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl OsFileSystem {
    /// Create a new OS filesystem.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for OsFileSystem {
    async fn read_file_string(&self, path: &Path) -> Result<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                trace!(path = %path.display(), len = content.len(), "read file");
                Ok(content)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "file does not exist, treating as empty");
                Ok(String::new())
            }
            Err(e) => Err(NetError::io(path, e)),
        }
    }

    async fn write_file_string(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| NetError::io(parent, e))?;
            }
        }

        tokio::fs::write(path, content)
            .await
            .map_err(|e| NetError::io(path, e))?;
        debug!(path = %path.display(), len = content.len(), "wrote file");
        Ok(())
    }

    async fn file_exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let entries = glob::glob(pattern).map_err(|e| {
            NetError::io(
                pattern,
                std::io::Error::new(ErrorKind::InvalidInput, e.to_string()),
            )
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) => paths.push(path),
                Err(e) => {
                    let path = e.path().to_path_buf();
                    return Err(NetError::io(path, e.into_error()));
                }
            }
        }
        paths.sort();
        Ok(paths)
    }
}
