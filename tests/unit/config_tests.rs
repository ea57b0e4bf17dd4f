// Configuration loading and wiring, end to end

use std::io::Write;
use tempfile::NamedTempFile;

use imagestack::config::{Config, ConfigError, StoreConfig};
use imagestack::{ImageFormat, TransformError};

use super::support::png_bytes;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_yaml_config_drives_full_pipeline() {
    let sources = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    std::fs::write(sources.path().join("cat.png"), png_bytes(40, 20)).unwrap();

    std::env::set_var("IMAGESTACK_IT_SOURCES", sources.path());
    std::env::set_var("IMAGESTACK_IT_CACHE", cache.path());
    let file = write_config(
        r#"
loaders:
  - name: local
    filesystem:
      roots: ["${IMAGESTACK_IT_SOURCES}"]
store:
  filesystem:
    root: "${IMAGESTACK_IT_CACHE}"
    base_url: /media/cache
default_filter_set_settings:
  quality: 85
filter_sets:
  thumb:
    filters:
      thumbnail: { size: [10, 10], mode: outbound }
      grayscale: ~
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();
    let transformer = config.build_transformer().unwrap();

    let url = transformer
        .transform_to_url("cat.png", "thumb", ImageFormat::Jpeg)
        .await
        .unwrap();
    assert_eq!(url, "/media/cache/thumb/jpeg/cat.png");
    assert!(cache.path().join("thumb/jpeg/cat.png").is_file());

    let err = transformer
        .transform_to_url("dog.png", "thumb", ImageFormat::Jpeg)
        .await
        .unwrap_err();
    assert!(matches!(err, TransformError::SourceNotResolvable { .. }));
    assert!(err.to_string().contains("local=["));

    assert_eq!(
        transformer.invalidate_cache("cat.png", &[]).await.unwrap(),
        1
    );
}

#[test]
fn test_unset_variable_fails_load() {
    let file = write_config("store: { on_demand: { base_url: \"${IMAGESTACK_IT_NEVER_SET}\" } }");
    assert!(matches!(
        Config::from_file(file.path()),
        Err(ConfigError::MissingEnvVar(_))
    ));
}

#[test]
fn test_on_demand_store_section() {
    let config = Config::from_yaml_with_env(
        "store: { on_demand: { base_url: /resolve, signing_key: abc } }",
    )
    .unwrap();
    assert_eq!(
        config.store,
        StoreConfig::OnDemand {
            base_url: "/resolve".to_string(),
            signing_key: Some("abc".to_string()),
        }
    );
    assert!(config.build_store().supports_on_demand_creation());
}

#[test]
fn test_filter_order_is_document_order() {
    let config = Config::from_yaml_with_env(
        "filter_sets: { s: { filters: { strip: ~, crop: { size: [1, 1] }, flip: { axis: x } } } }",
    )
    .unwrap();
    let names: Vec<&str> = config.filter_sets["s"]
        .filters
        .as_ref()
        .unwrap()
        .names()
        .collect();
    assert_eq!(names, vec!["strip", "crop", "flip"]);
}

#[test]
fn test_duplicate_filter_key_is_rejected() {
    let result = Config::from_yaml_with_env("filter_sets: { s: { filters: { strip: ~, strip: ~ } } }");
    assert!(result.is_err());
}
