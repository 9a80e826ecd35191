// src/storage/filesystem.rs
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use super::BackupStore;

/// Backup store rooted at a local directory. Used for development and tests.
#[derive(Debug)]
pub struct FilesystemStorage {
    base: PathBuf,
}

impl FilesystemStorage {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn url_to_path(url: &str) -> Result<&Path> {
        url.strip_prefix("file://")
            .map(Path::new)
            .ok_or_else(|| anyhow::anyhow!("Invalid file URL: {}", url))
    }
}

#[async_trait]
impl BackupStore for FilesystemStorage {
    fn object_url(&self, key: &str) -> String {
        format!("file://{}", self.base.join(key).display())
    }

    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> Result<String> {
        let url = self.object_url(key);
        let path = Self::url_to_path(&url)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, &data).await?;
        Ok(url)
    }
}
