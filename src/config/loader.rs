//! Source loader configuration.
//!
//! Loaders are listed in priority order; the chain tries them top to bottom.
//!
//! ```yaml
//! loaders:
//!   - name: local
//!     filesystem:
//!       roots: ["/srv/images", "/srv/uploads"]
//!   - name: origin
//!     http:
//!       base_url: "https://origin.example.com/images"
//!       timeout_seconds: 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::DEFAULT_HTTP_LOADER_TIMEOUT_SECS;
use crate::loader::{FileSystemLoader, HttpLoader, LoadError, Loader};

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_LOADER_TIMEOUT_SECS
}

/// One entry of the `loaders` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: LoaderKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderKind {
    #[serde(rename = "filesystem")]
    FileSystem { roots: Vec<PathBuf> },
    Http {
        base_url: String,
        #[serde(default = "default_http_timeout")]
        timeout_seconds: u64,
    },
}

impl LoaderConfig {
    pub fn build(&self) -> Result<Arc<dyn Loader>, LoadError> {
        Ok(match &self.kind {
            LoaderKind::FileSystem { roots } => Arc::new(FileSystemLoader::new(roots.clone())),
            LoaderKind::Http {
                base_url,
                timeout_seconds,
            } => Arc::new(HttpLoader::new(
                base_url.clone(),
                Duration::from_secs(*timeout_seconds),
            )?),
        })
    }

    /// Problems with this entry, as human-readable messages
    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("Loader name cannot be empty".to_string());
        }
        match &self.kind {
            LoaderKind::FileSystem { roots } => {
                if roots.is_empty() {
                    problems.push(format!(
                        "Loader '{}': filesystem loader needs at least one root",
                        self.name
                    ));
                }
            }
            LoaderKind::Http {
                base_url,
                timeout_seconds,
            } => {
                if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                    problems.push(format!(
                        "Loader '{}': base_url '{}' must start with http:// or https://",
                        self.name, base_url
                    ));
                }
                if *timeout_seconds == 0 {
                    problems.push(format!(
                        "Loader '{}': timeout_seconds must be > 0",
                        self.name
                    ));
                }
            }
        }
        problems
    }
}
