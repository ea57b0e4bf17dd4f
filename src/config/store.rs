//! Image store configuration.
//!
//! Exactly one store backs a deployment:
//!
//! ```yaml
//! store:
//!   filesystem:
//!     root: /var/cache/imagestack
//!     base_url: /media/cache
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::constants::DEFAULT_MEMORY_STORE_MAX_ENTRIES;
use crate::signing::HmacUrlSigner;
use crate::store::{FileSystemStore, ImageStore, MemoryStore, OnDemandStore};

fn default_max_entries() -> u64 {
    DEFAULT_MEMORY_STORE_MAX_ENTRIES
}

/// Store backend selection
///
/// Serialized as a single-key map (`filesystem: {...}`); embed it with
/// `#[serde(with = "serde_yaml::with::singleton_map")]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    Memory {
        #[serde(default)]
        base_url: String,
        #[serde(default = "default_max_entries")]
        max_entries: u64,
    },
    #[serde(rename = "filesystem")]
    FileSystem {
        root: PathBuf,
        #[serde(default)]
        base_url: String,
        #[serde(default)]
        on_demand: bool,
    },
    OnDemand {
        base_url: String,
        /// HMAC key for the `hash` query parameter; URLs are unsigned without it
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signing_key: Option<String>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory {
            base_url: String::new(),
            max_entries: default_max_entries(),
        }
    }
}

impl StoreConfig {
    pub fn build(&self) -> Arc<dyn ImageStore> {
        match self {
            StoreConfig::Memory {
                base_url,
                max_entries,
            } => Arc::new(MemoryStore::new(base_url.clone(), *max_entries)),
            StoreConfig::FileSystem {
                root,
                base_url,
                on_demand,
            } => Arc::new(
                FileSystemStore::new(root.clone(), base_url.clone()).with_on_demand(*on_demand),
            ),
            StoreConfig::OnDemand {
                base_url,
                signing_key,
            } => {
                let store = OnDemandStore::new(base_url.clone());
                match signing_key {
                    Some(key) => Arc::new(
                        store.with_signer(Arc::new(HmacUrlSigner::new(key.as_bytes().to_vec()))),
                    ),
                    None => Arc::new(store),
                }
            }
        }
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match self {
            StoreConfig::Memory { max_entries, .. } => {
                if *max_entries == 0 {
                    problems.push("Memory store max_entries must be > 0".to_string());
                }
            }
            StoreConfig::FileSystem { root, .. } => {
                if root.as_os_str().is_empty() {
                    problems.push("Filesystem store root cannot be empty".to_string());
                }
            }
            StoreConfig::OnDemand {
                base_url,
                signing_key,
            } => {
                if base_url.is_empty() {
                    problems.push("On-demand store needs a base_url".to_string());
                }
                if matches!(signing_key, Some(key) if key.is_empty()) {
                    problems.push("On-demand store signing_key cannot be empty".to_string());
                }
            }
        }
        problems
    }
}
