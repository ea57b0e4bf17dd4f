// Image store contract: stored derivatives exist, URLs are stable,
// invalidation is scoped to the requested stacks

use std::sync::Arc;

use imagestack::store::{DerivedKey, FileSystemStore, ImageStore, MemoryStore};
use imagestack::{ImageArtifact, ImageFormat, Transformer};

use super::support::{chain, executor, png_bytes, CountingLoader};

fn artifact() -> ImageArtifact {
    ImageArtifact::from_bytes(png_bytes(2, 2))
}

async fn assert_store_contract(store: &dyn ImageStore) {
    let key = DerivedKey::new("albums/cat.png", "thumb", ImageFormat::Png);
    assert!(!store.exists(&key).await.unwrap());

    let stored = store.store(artifact(), &key).await.unwrap();
    assert!(store.exists(&key).await.unwrap());

    let url = store.url(&key).unwrap();
    assert_eq!(store.url(&key).unwrap(), url);
    assert_eq!(stored.url(), Some(url.as_str()));
    assert!(url.ends_with("/thumb/png/albums/cat.png"));

    // Storing again overwrites without changing the URL
    store.store(artifact(), &key).await.unwrap();
    assert_eq!(store.url(&key).unwrap(), url);
}

#[tokio::test]
async fn test_memory_store_contract() {
    assert_store_contract(&MemoryStore::new("https://cdn.test/media", 100)).await;
}

#[tokio::test]
async fn test_filesystem_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    assert_store_contract(&FileSystemStore::new(dir.path(), "/media/cache")).await;
}

async fn warmed(store: Arc<dyn ImageStore>) -> Transformer {
    let transformer = Transformer::new(
        chain(CountingLoader::new(png_bytes(8, 8))),
        executor("{}", "thumb: { filters: { thumbnail: { size: [2, 2] } } }\nbanner: {}"),
        store,
    );
    for source in ["img1", "img2"] {
        transformer
            .warmup_cache(
                source,
                &["thumb".to_string(), "banner".to_string()],
                &[ImageFormat::Png, ImageFormat::Jpeg],
            )
            .await
            .unwrap();
    }
    transformer
}

async fn exists(store: &dyn ImageStore, source: &str, stack: &str, format: ImageFormat) -> bool {
    store
        .exists(&DerivedKey::new(source, stack, format))
        .await
        .unwrap()
}

async fn check_invalidation_scope(store: Arc<dyn ImageStore>) {
    let transformer = warmed(Arc::clone(&store)).await;

    let removed = transformer
        .invalidate_cache("img1", &["thumb".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 2);
    for format in [ImageFormat::Png, ImageFormat::Jpeg] {
        assert!(!exists(store.as_ref(), "img1", "thumb", format).await);
        assert!(exists(store.as_ref(), "img1", "banner", format).await);
        assert!(exists(store.as_ref(), "img2", "thumb", format).await);
    }

    let removed = transformer.invalidate_cache("img1", &[]).await.unwrap();
    assert_eq!(removed, 2);
    for format in [ImageFormat::Png, ImageFormat::Jpeg] {
        assert!(!exists(store.as_ref(), "img1", "banner", format).await);
        assert!(exists(store.as_ref(), "img2", "banner", format).await);
    }

    // Nothing left to delete is not an error
    assert_eq!(transformer.invalidate_cache("img1", &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_memory_store_invalidation_scope() {
    check_invalidation_scope(Arc::new(MemoryStore::new("/media", 100))).await;
}

#[tokio::test]
async fn test_filesystem_store_invalidation_scope() {
    let dir = tempfile::tempdir().unwrap();
    check_invalidation_scope(Arc::new(FileSystemStore::new(dir.path(), "/media"))).await;
}

#[rstest::rstest]
#[case(ImageFormat::Jpeg, "/media/thumb/jpeg/a%20b.png")]
#[case(ImageFormat::Png, "/media/thumb/png/a%20b.png")]
#[case(ImageFormat::Gif, "/media/thumb/gif/a%20b.png")]
#[case(ImageFormat::WebP, "/media/thumb/webp/a%20b.png")]
#[case(ImageFormat::Avif, "/media/thumb/avif/a%20b.png")]
fn test_url_layout_per_format(#[case] format: ImageFormat, #[case] expected: &str) {
    let key = DerivedKey::new("a b.png", "thumb", format);
    assert_eq!(MemoryStore::new("/media/", 1).url(&key).unwrap(), expected);
}
