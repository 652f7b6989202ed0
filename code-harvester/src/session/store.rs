//! Session blob persistence.
//!
//! The messaging client owns the contents of a blob; this layer only stores,
//! publishes (renames) and removes them by name.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::utils::fs;
use crate::{Error, Result};

const BLOB_EXTENSION: &str = "session";

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write a blob, replacing any existing one with the same name.
    async fn save(&self, name: &str, blob: &[u8]) -> Result<()>;

    /// Read a blob. `None` if no blob exists under `name`.
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Atomically publish `from` under `to`, replacing any blob already named `to`.
    ///
    /// On error the source blob is left untouched.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Remove a blob. Returns whether anything was removed; absence is not an error.
    async fn delete(&self, name: &str) -> Result<bool>;

    async fn exists(&self, name: &str) -> Result<bool>;
}

/// Stores each blob as `<dir>/<name>.session`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::ensure_dir_all_with_op("creating session directory", &dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.{BLOB_EXTENSION}")))
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid session name: {name:?}")))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, name: &str, blob: &[u8]) -> Result<()> {
        let path = self.blob_path(name)?;
        let staging = path.with_extension(format!("{BLOB_EXTENSION}.part"));

        tokio::fs::write(&staging, blob)
            .await
            .map_err(|e| fs::io_error("writing session blob", &staging, e))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| fs::io_error("publishing session blob", &path, e))?;

        debug!(session = %name, bytes = blob.len(), "Saved session blob");
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(fs::io_error("reading session blob", &path, e)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let source = self.blob_path(from)?;
        let target = self.blob_path(to)?;
        if source == target {
            return Ok(());
        }

        match tokio::fs::rename(&source, &target).await {
            Ok(()) => {
                debug!(from = %from, to = %to, "Published session blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::SessionStore(
                format!("cannot rename missing session blob {from:?}"),
            )),
            Err(e) => Err(fs::io_error("renaming session blob", &source, e)),
        }
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let path = self.blob_path(name)?;
        fs::remove_file_if_exists(&path).await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.blob_path(name)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| fs::io_error("checking session blob", &path, e))
    }
}
