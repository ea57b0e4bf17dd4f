// Chain loader resolution order and diagnostics

use async_trait::async_trait;
use std::sync::Arc;

use imagestack::loader::{ChainLoader, FileSystemLoader, LoadError, Loader};
use imagestack::{ImageArtifact, ImageFormat, TransformError};

use super::support::{png_bytes, CountingLoader, FailingLoader};

struct PanicLoader;

#[async_trait]
impl Loader for PanicLoader {
    async fn find(&self, _source_id: &str) -> Result<ImageArtifact, LoadError> {
        panic!("loaders after the first success must not be consulted");
    }
}

#[tokio::test]
async fn test_first_success_wins_and_later_loaders_are_skipped() {
    let bytes = png_bytes(3, 3);
    let second = CountingLoader::new(bytes.clone());
    let chain = ChainLoader::new()
        .with_loader("first", Arc::new(FailingLoader("connection refused")))
        .with_loader("second", second.clone())
        .with_loader("third", Arc::new(PanicLoader));

    let artifact = chain.resolve("cat.png").await.unwrap();
    assert_eq!(artifact.content().as_ref(), bytes.as_slice());
    assert_eq!(artifact.format(), Some(ImageFormat::Png));
    assert_eq!(second.calls(), 1);
}

#[tokio::test]
async fn test_all_loaders_failing_names_each_one() {
    let chain = ChainLoader::new()
        .with_loader("local", Arc::new(FailingLoader("no such file")))
        .with_loader("origin", Arc::new(FailingLoader("HTTP request failed with status: 503")));

    let err = chain.resolve("cat.png").await.unwrap_err();
    match &err {
        TransformError::SourceNotResolvable {
            source_id,
            loaders,
            failures,
        } => {
            assert_eq!(source_id, "cat.png");
            assert_eq!(loaders, &vec!["local".to_string(), "origin".to_string()]);
            assert_eq!(failures.len(), 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("local=["));
    assert!(message.contains("origin=["));
    assert_eq!(err.to_http_status(), 404);
}

#[tokio::test]
async fn test_empty_chain_fails() {
    let err = ChainLoader::new().resolve("cat.png").await.unwrap_err();
    assert!(matches!(err, TransformError::SourceNotResolvable { .. }));
}

#[tokio::test]
async fn test_filesystem_loader_in_chain() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("albums")).unwrap();
    std::fs::write(dir.path().join("albums/cat.png"), png_bytes(2, 2)).unwrap();

    let chain = ChainLoader::new()
        .with_loader("remote", Arc::new(FailingLoader("timeout")))
        .with_loader(
            "local",
            Arc::new(FileSystemLoader::new(vec![dir.path().to_path_buf()])),
        );

    let artifact = chain.resolve("albums/cat.png").await.unwrap();
    assert_eq!(artifact.mime_type().as_deref(), Some("image/png"));

    let err = chain.resolve("../etc/passwd").await.unwrap_err();
    assert!(matches!(err, TransformError::SourceNotResolvable { .. }));
}
