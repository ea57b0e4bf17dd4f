//! Filesystem-backed derivative store
//!
//! Layout: `{root}/{stack}/{format}/{source_id}`. Writes go to a temporary
//! sibling file that is renamed into place, so readers never see a partial
//! derivative and concurrent writers for the same key resolve to last
//! write wins.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{join_url, DerivedKey, ImageStore, StoreError};
use crate::artifact::ImageArtifact;
use crate::format::ImageFormat;

#[derive(Debug, Clone)]
pub struct FileSystemStore {
    root: PathBuf,
    base_url: String,
    on_demand: bool,
}

impl FileSystemStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
            on_demand: false,
        }
    }

    /// Declare that a fallback handler computes missing derivatives on fetch
    pub fn with_on_demand(mut self, on_demand: bool) -> Self {
        self.on_demand = on_demand;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the derivative for `key`
    pub fn path_for(&self, key: &DerivedKey) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(key.relative_path()?))
    }

    async fn write_file_atomic(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Unique temp name so concurrent writers never share a temp file
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
        tokio::fs::write(&temp_path, data).await?;

        if let Err(err) = tokio::fs::rename(&temp_path, path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Remove one file; a missing file counts as nothing removed
    async fn remove_if_present(path: &Path) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Stack directories currently present under the root
    async fn stack_dirs(&self) -> Result<Vec<String>, StoreError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut stacks = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                stacks.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(stacks)
    }
}

#[async_trait]
impl ImageStore for FileSystemStore {
    async fn exists(&self, key: &DerivedKey) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn url(&self, key: &DerivedKey) -> Result<String, StoreError> {
        // Validate so we never hand out a URL we would refuse to store
        key.relative_path()?;
        Ok(join_url(&self.base_url, key))
    }

    async fn store(
        &self,
        artifact: ImageArtifact,
        key: &DerivedKey,
    ) -> Result<ImageArtifact, StoreError> {
        let path = self.path_for(key)?;
        self.write_file_atomic(&path, artifact.content()).await?;
        tracing::debug!(
            key = %key,
            path = %path.display(),
            bytes = artifact.len(),
            "Stored derivative on disk"
        );
        Ok(artifact.with_url(join_url(&self.base_url, key)))
    }

    async fn delete(&self, source_id: &str, stacks: &[String]) -> Result<usize, StoreError> {
        let stacks = if stacks.is_empty() {
            self.stack_dirs().await?
        } else {
            stacks.to_vec()
        };

        let mut removed = 0;
        for stack in &stacks {
            for format in ImageFormat::ALL {
                let key = DerivedKey::new(source_id, stack.as_str(), format);
                let path = self.path_for(&key)?;
                if Self::remove_if_present(&path).await? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn supports_on_demand_creation(&self) -> bool {
        self.on_demand
    }
}
