//! Loads source images from local directories

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::{LoadError, Loader};
use crate::artifact::{ImageArtifact, MagicBytesGuesser, MimeTypeGuesser};
use crate::store::normalize_source_id;

/// Resolves relative source ids against a list of root directories
///
/// Roots are tried in order. Ids that are absolute or climb out of a root
/// with `..` are rejected before touching the filesystem.
pub struct FileSystemLoader {
    roots: Vec<PathBuf>,
    guesser: Arc<dyn MimeTypeGuesser>,
}

impl FileSystemLoader {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            guesser: Arc::new(MagicBytesGuesser),
        }
    }

    pub fn with_guesser(mut self, guesser: Arc<dyn MimeTypeGuesser>) -> Self {
        self.guesser = guesser;
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn relative(source_id: &str) -> Result<&Path, LoadError> {
        let invalid = |reason: &str| LoadError::InvalidId {
            id: source_id.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = normalize_source_id(source_id);
        if trimmed.is_empty() {
            return Err(invalid("empty path"));
        }
        let path = Path::new(trimmed);
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(invalid("path escapes the loader roots")),
            }
        }
        Ok(path)
    }
}

impl std::fmt::Debug for FileSystemLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemLoader")
            .field("roots", &self.roots)
            .finish()
    }
}

#[async_trait]
impl Loader for FileSystemLoader {
    async fn find(&self, source_id: &str) -> Result<ImageArtifact, LoadError> {
        let relative = Self::relative(source_id)?;

        for root in &self.roots {
            let path = root.join(relative);
            match tokio::fs::read(&path).await {
                Ok(data) => {
                    let mime_type = self.guesser.guess(&data);
                    return Ok(ImageArtifact::new(data, mime_type, None));
                }
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(LoadError::NotFound(source_id.to_string()))
    }
}
