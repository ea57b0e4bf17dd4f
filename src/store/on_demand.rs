//! Store for deployments that compute every derivative lazily
//!
//! Nothing is persisted here. URLs point at a fallback handler which
//! computes the derivative on first fetch; when a signer is configured the
//! URL carries a `hash` query parameter the handler verifies.

use async_trait::async_trait;
use std::sync::Arc;

use super::{join_url, DerivedKey, ImageStore, StoreError};
use crate::artifact::ImageArtifact;
use crate::signing::UrlSigner;

pub struct OnDemandStore {
    base_url: String,
    signer: Option<Arc<dyn UrlSigner>>,
}

impl OnDemandStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            signer: None,
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn UrlSigner>) -> Self {
        self.signer = Some(signer);
        self
    }
}

impl std::fmt::Debug for OnDemandStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnDemandStore")
            .field("base_url", &self.base_url)
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

#[async_trait]
impl ImageStore for OnDemandStore {
    async fn exists(&self, _key: &DerivedKey) -> Result<bool, StoreError> {
        Ok(false)
    }

    fn url(&self, key: &DerivedKey) -> Result<String, StoreError> {
        let url = join_url(&self.base_url, key);
        Ok(match &self.signer {
            Some(signer) => {
                let hash = signer.sign(&key.url_path(), None);
                format!("{}?hash={}", url, urlencoding::encode(&hash))
            }
            None => url,
        })
    }

    async fn store(
        &self,
        artifact: ImageArtifact,
        key: &DerivedKey,
    ) -> Result<ImageArtifact, StoreError> {
        tracing::debug!(key = %key, "On-demand store does not persist derivatives");
        Ok(artifact.with_url(self.url(key)?))
    }

    async fn delete(&self, _source_id: &str, _stacks: &[String]) -> Result<usize, StoreError> {
        Ok(0)
    }

    fn supports_on_demand_creation(&self) -> bool {
        true
    }
}
