//! Object storage abstraction for the ledger and CSV output.
//!
//! The backend is chosen once at startup from `[storage].backend`:
//! [`LocalStore`] writes under a directory, [`S3Store`](crate::s3::S3Store)
//! talks to an S3-compatible bucket. Keys are `/`-separated relative paths.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, StorageBackend};
use crate::s3::S3Store;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the object's bytes, or `None` if it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Creates or replaces an object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Human-readable location, used in log and error messages.
    fn describe(&self) -> String;
}

/// Builds the configured store.
pub fn open_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.storage.backend {
        StorageBackend::Local => Ok(Arc::new(LocalStore::new(&config.storage.root))),
        StorageBackend::S3 => {
            let s3 = config
                .storage
                .s3
                .clone()
                .context("storage.backend = \"s3\" requires a [storage.s3] section")?;
            Ok(Arc::new(S3Store::from_env(s3)?))
        }
    }
}

/// Directory-backed store.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        if key.is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("invalid object key: '{}'", key);
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        // Write to a sibling and rename so readers never see a partial ledger.
        let tmp = path.with_extension("partial");
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move {} into place", path.display()))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
