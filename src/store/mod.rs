//! Derivative storage
//!
//! An [`ImageStore`] decides whether a derivative exists, hands out its
//! public URL, persists new derivatives and deletes them on invalidation.
//! Every operation is keyed by a [`DerivedKey`].
//!
//! Two modes exist:
//! - precomputed: a URL is only meaningful once `exists` is true, so the
//!   transformer computes and stores the derivative first
//! - on-demand: the URL is always valid; whatever serves it computes the
//!   derivative on first fetch
//!
//! Implementations:
//! - [`MemoryStore`]: moka-backed in-process store
//! - [`FileSystemStore`]: files under a root directory
//! - [`OnDemandStore`]: persists nothing, URLs are computed lazily elsewhere

pub mod filesystem;
pub mod memory;
pub mod on_demand;

use async_trait::async_trait;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::artifact::ImageArtifact;
use crate::format::ImageFormat;

pub use filesystem::FileSystemStore;
pub use memory::MemoryStore;
pub use on_demand::OnDemandStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid derivative key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Identity of one cached derivative
///
/// At most one stored artifact exists per key; storing again overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedKey {
    pub source_id: String,
    pub stack: String,
    pub format: ImageFormat,
}

/// Canonical form of a source id: leading slashes carry no meaning
pub fn normalize_source_id(source_id: &str) -> &str {
    source_id.trim_start_matches('/')
}

impl DerivedKey {
    /// Build a key; `source_id` is normalized so `/a.png` and `a.png` are one key
    pub fn new(source_id: impl Into<String>, stack: impl Into<String>, format: ImageFormat) -> Self {
        let source_id: String = source_id.into();
        Self {
            source_id: normalize_source_id(&source_id).to_string(),
            stack: stack.into(),
            format,
        }
    }

    /// `{stack}/{format}/{source_id}` with each path segment percent-encoded
    pub fn url_path(&self) -> String {
        let source = self
            .source_id
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/{}/{}",
            urlencoding::encode(&self.stack),
            self.format.as_str(),
            source
        )
    }

    /// Relative filesystem path `{stack}/{format}/{source_id}`
    ///
    /// Fails if any component could escape the directory it is joined to.
    pub fn relative_path(&self) -> Result<PathBuf, StoreError> {
        let stack = checked_segment(&self.stack, self)?;
        let source = checked_relative(&self.source_id, self)?;
        Ok(Path::new(stack).join(self.format.as_str()).join(source))
    }

    /// Whether this key belongs to `source_id` and one of `stacks`
    ///
    /// An empty `stacks` list matches every stack.
    pub fn matches(&self, source_id: &str, stacks: &[String]) -> bool {
        self.source_id == normalize_source_id(source_id)
            && (stacks.is_empty() || stacks.contains(&self.stack))
    }
}

impl fmt::Display for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.stack, self.format, self.source_id)
    }
}

fn invalid(key: &DerivedKey, reason: &str) -> StoreError {
    StoreError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn checked_segment<'a>(segment: &'a str, key: &DerivedKey) -> Result<&'a str, StoreError> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains(['/', '\\']) {
        return Err(invalid(key, "stack name is not a single path segment"));
    }
    Ok(segment)
}

/// Validate a relative path made only of normal components
pub(crate) fn checked_relative<'a>(
    path: &'a str,
    key: &DerivedKey,
) -> Result<&'a Path, StoreError> {
    let relative = Path::new(path);
    if path.is_empty() || path.contains('\\') {
        return Err(invalid(key, "source id is empty or contains a backslash"));
    }
    if !relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(invalid(key, "source id must be a relative path without '..'"));
    }
    Ok(relative)
}

/// Join a base URL and a key path, tolerating a trailing slash on the base
pub(crate) fn join_url(base_url: &str, key: &DerivedKey) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), key.url_path())
}

/// Derivative storage contract
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Whether a derivative is currently stored under `key`
    async fn exists(&self, key: &DerivedKey) -> Result<bool, StoreError>;

    /// Public URL of the derivative
    ///
    /// Deterministic for a given key. Unless the store supports on-demand
    /// creation, the caller must establish existence first.
    fn url(&self, key: &DerivedKey) -> Result<String, StoreError>;

    /// Persist `artifact` under `key`, overwriting any previous derivative
    ///
    /// Returns the artifact with its final URL attached.
    async fn store(
        &self,
        artifact: ImageArtifact,
        key: &DerivedKey,
    ) -> Result<ImageArtifact, StoreError>;

    /// Delete derivatives of `source_id`
    ///
    /// With an empty `stacks` list every stack and format is removed,
    /// otherwise only the named stacks (all formats each). Deleting what
    /// does not exist is not an error. Returns the number of derivatives
    /// removed.
    async fn delete(&self, source_id: &str, stacks: &[String]) -> Result<usize, StoreError>;

    /// Fixed at construction
    fn supports_on_demand_creation(&self) -> bool;
}
