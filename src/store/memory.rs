//! In-process derivative store backed by moka
//!
//! Derivatives live in a bounded moka cache keyed by [`DerivedKey`]. When
//! the cache is full moka evicts by its TinyLFU policy; an evicted
//! derivative simply reports `exists == false` and gets recomputed.

use async_trait::async_trait;

use super::{join_url, DerivedKey, ImageStore, StoreError};
use crate::artifact::ImageArtifact;
use crate::constants::DEFAULT_MEMORY_STORE_MAX_ENTRIES;

pub struct MemoryStore {
    base_url: String,
    cache: moka::future::Cache<DerivedKey, ImageArtifact>,
}

impl MemoryStore {
    pub fn new(base_url: impl Into<String>, max_entries: u64) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(max_entries)
            .build();
        Self {
            base_url: base_url.into(),
            cache,
        }
    }

    /// Stored artifact for `key`, if any
    pub async fn get(&self, key: &DerivedKey) -> Option<ImageArtifact> {
        self.cache.get(key).await
    }

    /// Number of stored derivatives
    ///
    /// Runs moka's pending maintenance first so the count is current.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("base_url", &self.base_url)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("", DEFAULT_MEMORY_STORE_MAX_ENTRIES)
    }
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn exists(&self, key: &DerivedKey) -> Result<bool, StoreError> {
        Ok(self.cache.contains_key(key))
    }

    fn url(&self, key: &DerivedKey) -> Result<String, StoreError> {
        Ok(join_url(&self.base_url, key))
    }

    async fn store(
        &self,
        artifact: ImageArtifact,
        key: &DerivedKey,
    ) -> Result<ImageArtifact, StoreError> {
        let stored = artifact.with_url(self.url(key)?);
        self.cache.insert(key.clone(), stored.clone()).await;
        tracing::debug!(key = %key, bytes = stored.len(), "Stored derivative in memory");
        Ok(stored)
    }

    async fn delete(&self, source_id: &str, stacks: &[String]) -> Result<usize, StoreError> {
        // moka's iter() yields Arc<K>
        let keys_to_delete: Vec<DerivedKey> = self
            .cache
            .iter()
            .filter(|(key, _)| key.matches(source_id, stacks))
            .map(|(key, _)| (*key).clone())
            .collect();

        let count = keys_to_delete.len();
        for key in keys_to_delete {
            self.cache.invalidate(&key).await;
        }
        self.cache.run_pending_tasks().await;

        Ok(count)
    }

    fn supports_on_demand_creation(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ImageFormat;

    fn key(source: &str, stack: &str, format: ImageFormat) -> DerivedKey {
        DerivedKey::new(source, stack, format)
    }

    fn artifact() -> ImageArtifact {
        ImageArtifact::new(vec![1, 2, 3], Some("image/png".into()), Some(ImageFormat::Png))
    }

    #[tokio::test]
    async fn test_store_then_exists() {
        let store = MemoryStore::new("http://cdn.test/media", 100);
        let key = key("cats/a.jpg", "thumb", ImageFormat::Png);
        assert!(!store.exists(&key).await.unwrap());

        let stored = store.store(artifact(), &key).await.unwrap();
        assert!(store.exists(&key).await.unwrap());
        assert_eq!(stored.url(), Some("http://cdn.test/media/thumb/png/cats/a.jpg"));
        assert_eq!(store.get(&key).await.unwrap().content().as_ref(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_url_is_idempotent() {
        let store = MemoryStore::new("http://cdn.test/", 100);
        let key = key("a.jpg", "thumb", ImageFormat::Jpeg);
        store.store(artifact(), &key).await.unwrap();
        let first = store.url(&key).unwrap();
        let second = store.url(&key).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_store_overwrites_existing_derivative() {
        let store = MemoryStore::new("", 100);
        let key = key("a.jpg", "thumb", ImageFormat::Png);
        store.store(artifact(), &key).await.unwrap();
        store
            .store(ImageArtifact::from_bytes(vec![9]), &key)
            .await
            .unwrap();
        assert_eq!(store.get(&key).await.unwrap().content().as_ref(), &[9]);
        assert_eq!(store.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_delete_scoped_to_stacks() {
        let store = MemoryStore::new("", 100);
        let thumb_png = key("img1", "thumb", ImageFormat::Png);
        let thumb_webp = key("img1", "thumb", ImageFormat::WebP);
        let banner = key("img1", "banner", ImageFormat::Png);
        let other = key("img2", "thumb", ImageFormat::Png);
        for k in [&thumb_png, &thumb_webp, &banner, &other] {
            store.store(artifact(), k).await.unwrap();
        }

        let removed = store.delete("img1", &["thumb".to_string()]).await.unwrap();
        assert_eq!(removed, 2);
        assert!(!store.exists(&thumb_png).await.unwrap());
        assert!(!store.exists(&thumb_webp).await.unwrap());
        assert!(store.exists(&banner).await.unwrap());
        assert!(store.exists(&other).await.unwrap());

        let removed = store.delete("img1", &[]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!store.exists(&banner).await.unwrap());
        assert!(store.exists(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_an_error() {
        let store = MemoryStore::default();
        assert_eq!(store.delete("nothing", &[]).await.unwrap(), 0);
    }

    #[test]
    fn test_memory_store_is_precomputed() {
        assert!(!MemoryStore::default().supports_on_demand_creation());
    }
}
