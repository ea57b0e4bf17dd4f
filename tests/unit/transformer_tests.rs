// Transformer orchestration against real stores

use std::sync::Arc;

use imagestack::signing::{HmacUrlSigner, UrlSigner};
use imagestack::store::{DerivedKey, FileSystemStore, ImageStore, MemoryStore, OnDemandStore};
use imagestack::{ImageFormat, TransformError, Transformer};

use super::support::{chain, executor, png_bytes, CountingLoader};

const STACKS: &str = "thumb: { filters: { thumbnail: { size: [4, 4] } } }\n\
                      broken: { filters: { ghost: {} } }";

fn transformer(store: Arc<dyn ImageStore>) -> (Transformer, Arc<CountingLoader>) {
    let loader = CountingLoader::new(png_bytes(16, 16));
    let transformer = Transformer::new(chain(loader.clone()), executor("{}", STACKS), store);
    (transformer, loader)
}

#[tokio::test]
async fn test_on_demand_store_never_runs_pipeline() {
    let signer = Arc::new(HmacUrlSigner::new(b"secret".to_vec()));
    let store = Arc::new(OnDemandStore::new("https://img.test/resolve").with_signer(signer.clone()));
    let (transformer, loader) = transformer(store);

    let url = transformer
        .transform_to_url("cat.png", "thumb", ImageFormat::WebP)
        .await
        .unwrap();
    assert_eq!(loader.calls(), 0);

    let (path, hash) = url.split_once("?hash=").unwrap();
    assert_eq!(path, "https://img.test/resolve/thumb/webp/cat.png");
    let hash = urlencoding::decode(hash).unwrap();
    assert!(signer.verify(&hash, "thumb/webp/cat.png", None));

    // Even a source no loader can find gets a URL
    transformer
        .transform_to_url("missing", "thumb", ImageFormat::Png)
        .await
        .unwrap();
    assert_eq!(loader.calls(), 0);
}

#[tokio::test]
async fn test_on_demand_filesystem_store_skips_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileSystemStore::new(dir.path(), "/media").with_on_demand(true));
    let (transformer, loader) = transformer(store.clone());

    let url = transformer
        .transform_to_url("cat.png", "thumb", ImageFormat::Png)
        .await
        .unwrap();
    assert_eq!(url, "/media/thumb/png/cat.png");
    assert_eq!(loader.calls(), 0);
    assert!(!store
        .exists(&DerivedKey::new("cat.png", "thumb", ImageFormat::Png))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_miss_computes_and_stores_then_hits() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileSystemStore::new(dir.path(), "/media"));
    let (transformer, loader) = transformer(store.clone());

    let url = transformer
        .transform_to_url("cat.png", "thumb", ImageFormat::Jpeg)
        .await
        .unwrap();
    assert_eq!(url, "/media/thumb/jpeg/cat.png");
    let path = dir.path().join("thumb/jpeg/cat.png");
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

    let again = transformer
        .transform_to_url("cat.png", "thumb", ImageFormat::Jpeg)
        .await
        .unwrap();
    assert_eq!(again, url);
    assert_eq!(loader.calls(), 1);
}

#[tokio::test]
async fn test_rooted_source_id_shares_derivative_with_relative_one() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileSystemStore::new(dir.path(), "/media"));
    let (transformer, loader) = transformer(store);

    let rooted = transformer
        .transform_to_url("/cat.png", "thumb", ImageFormat::Png)
        .await
        .unwrap();
    let relative = transformer
        .transform_to_url("cat.png", "thumb", ImageFormat::Png)
        .await
        .unwrap();
    assert_eq!(rooted, "/media/thumb/png/cat.png");
    assert_eq!(relative, rooted);
    assert_eq!(loader.calls(), 1);

    assert_eq!(transformer.invalidate_cache("/cat.png", &[]).await.unwrap(), 1);
    assert!(!dir.path().join("thumb/png/cat.png").exists());
}

#[tokio::test]
async fn test_failed_pipeline_yields_no_url_and_stores_nothing() {
    let store = Arc::new(MemoryStore::new("/media", 10));
    let (transformer, _) = transformer(store.clone());

    let err = transformer
        .transform_to_url("cat.png", "broken", ImageFormat::Png)
        .await
        .unwrap_err();
    assert!(matches!(err, TransformError::UnknownFilterOrPostProcessor { .. }));

    let err = transformer
        .transform_to_url("cat.png", "nope", ImageFormat::Png)
        .await
        .unwrap_err();
    assert!(matches!(err, TransformError::StackNotFound { .. }));
    assert_eq!(store.entry_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_share_one_computation() {
    let store = Arc::new(MemoryStore::new("/media", 10));
    let (transformer, loader) = transformer(store);

    let tasks = (0..16).map(|_| {
        let transformer = transformer.clone();
        tokio::spawn(async move {
            transformer
                .transform_to_url("cat.png", "thumb", ImageFormat::Png)
                .await
        })
    });

    for result in futures::future::join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap(), "/media/thumb/png/cat.png");
    }
    // Late arrivals either hit the store or follow the single leader
    assert_eq!(loader.calls(), 1);
}

#[tokio::test]
async fn test_warmup_requires_stacks() {
    let (transformer, loader) = transformer(Arc::new(MemoryStore::default()));
    let err = transformer
        .warmup_cache("cat.png", &[], &[ImageFormat::Png])
        .await
        .unwrap_err();
    assert!(matches!(err, TransformError::NoStacksSpecified));
    assert_eq!(loader.calls(), 0);
}
