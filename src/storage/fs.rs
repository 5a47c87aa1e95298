//! Filesystem persistence of mirrored artifacts
use crate::state::Resource;
use crate::storage::layout::save_path;
use crate::storage::traits::{Persister, StorageError, StorageResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::trace;
use url::Url;

/// Writes resources under a local mirror root
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Writes `contents` to `path` through a sibling temp file, creating parent directories
async fn write_file(path: &Path, contents: &[u8]) -> StorageResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;

    tokio::fs::create_dir_all(parent).await?;

    let mut temp_name = file_name.to_os_string();
    temp_name.push(".part");
    let temp = parent.join(temp_name);

    tokio::fs::write(&temp, contents).await?;
    tokio::fs::rename(&temp, path).await?;

    trace!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

#[async_trait]
impl Persister for FsStore {
    fn save_path(&self, key: &Url) -> PathBuf {
        save_path(&self.root, key)
    }

    async fn save(&self, resource: &Resource) -> StorageResult<()> {
        let body = resource
            .body
            .as_deref()
            .ok_or_else(|| StorageError::MissingContent(resource.key.to_string()))?;

        if !resource.save_path.starts_with(&self.root) {
            return Err(StorageError::InvalidPath(
                resource.save_path.display().to_string(),
            ));
        }

        write_file(&resource.save_path, body).await?;

        if let Some(alias_path) = &resource.redirected_save_path {
            if alias_path != &resource.save_path && alias_path.starts_with(&self.root) {
                let alias_body = resource.redirected_body.as_deref().unwrap_or(body);
                write_file(alias_path, alias_body).await?;
            }
        }

        Ok(())
    }
}
