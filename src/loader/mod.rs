//! Source image resolution
//!
//! A [`Loader`] turns a source id into encoded bytes. Deployments usually
//! configure several (local roots first, then a remote origin) and put
//! them behind a [`ChainLoader`], which asks each in order and stops at
//! the first success.

pub mod filesystem;
pub mod http;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::artifact::ImageArtifact;
use crate::error::{LoaderFailure, TransformError};

pub use filesystem::FileSystemLoader;
pub use http::HttpLoader;

/// Why a single loader could not produce a source image
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Source image \"{0}\" not found")]
    NotFound(String),

    #[error("Invalid source id \"{id}\": {reason}")]
    InvalidId { id: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Fetches the encoded bytes of a source image
#[async_trait]
pub trait Loader: Send + Sync {
    async fn find(&self, source_id: &str) -> Result<ImageArtifact, LoadError>;
}

/// Ordered list of named loaders tried one after another
///
/// Loaders after the first success are never consulted. When every loader
/// fails, the error names each loader and what it reported.
#[derive(Clone, Default)]
pub struct ChainLoader {
    loaders: Vec<(String, Arc<dyn Loader>)>,
}

impl ChainLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a loader; entries with a blank name are skipped
    pub fn with_loader(mut self, name: impl Into<String>, loader: Arc<dyn Loader>) -> Self {
        let name = name.into();
        if name.trim().is_empty() {
            warn!("Ignoring loader registered without a name");
            return self;
        }
        self.loaders.push((name, loader));
        self
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.loaders.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Resolve `source_id` through the chain
    pub async fn resolve(&self, source_id: &str) -> Result<ImageArtifact, TransformError> {
        let mut failures = Vec::new();

        for (name, loader) in &self.loaders {
            match loader.find(source_id).await {
                Ok(artifact) => {
                    debug!(
                        source_id = %source_id,
                        loader = %name,
                        bytes = artifact.len(),
                        "Source image resolved"
                    );
                    return Ok(artifact);
                }
                Err(err) => {
                    warn!(
                        source_id = %source_id,
                        loader = %name,
                        error = %err,
                        "Loader declined source image"
                    );
                    failures.push(LoaderFailure {
                        loader: name.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        Err(TransformError::SourceNotResolvable {
            source_id: source_id.to_string(),
            loaders: self.names(),
            failures,
        })
    }
}

impl std::fmt::Debug for ChainLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainLoader")
            .field("loaders", &self.names())
            .finish()
    }
}
