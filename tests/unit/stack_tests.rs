// Stack configuration merge and executor behavior

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use imagestack::codec::{DecodedImage, EncodeOptions, ImageCodec, RasterCodec};
use imagestack::stack::{StackConfigResolver, StackSettings};
use imagestack::{ImageArtifact, ImageFormat, TransformError};

use super::support::{animated_gif_bytes, executor, png_bytes};

#[test]
fn test_stack_filters_replace_default_filters() {
    let defaults: StackSettings =
        serde_yaml::from_str("{ quality: 100, filters: { a: {} } }").unwrap();
    let stacks = serde_yaml::from_str("thumb: { filters: { b: {} } }").unwrap();
    let resolver = StackConfigResolver::new(&defaults, &stacks);

    let config = resolver.resolve("thumb").unwrap();
    assert_eq!(config.filters.names().collect::<Vec<_>>(), vec!["b"]);
    assert_eq!(config.quality, 100);
}

#[tokio::test]
async fn test_unknown_filter_is_named() {
    let executor = executor("{}", "broken: { filters: { ghost: {} } }");
    let source = ImageArtifact::from_bytes(png_bytes(4, 4));

    let err = executor.apply("broken", &source).await.unwrap_err();
    match &err {
        TransformError::UnknownFilterOrPostProcessor { filters, .. } => {
            assert_eq!(filters, &vec!["ghost".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test]
async fn test_animated_gif_to_webp_falls_back_to_gif() {
    let executor = executor("{}", "anim: { animated: true }");
    let source = ImageArtifact::from_bytes(animated_gif_bytes(6, 6, 3));
    assert_eq!(source.format(), Some(ImageFormat::Gif));

    let result = executor
        .apply_with_format("anim", &source, Some(ImageFormat::WebP))
        .await
        .unwrap();
    assert_eq!(result.format(), Some(ImageFormat::Gif));
    assert_eq!(result.mime_type().as_deref(), Some("image/gif"));
    assert!(result.content().starts_with(b"GIF8"));
}

#[tokio::test]
async fn test_still_webp_target_does_not_fall_back() {
    let executor = executor("{}", "still: {}");
    let source = ImageArtifact::from_bytes(png_bytes(6, 6));

    let result = executor
        .apply_with_format("still", &source, Some(ImageFormat::WebP))
        .await
        .unwrap();
    assert_eq!(result.format(), Some(ImageFormat::WebP));
}

/// Delegates to the raster codec but refuses every WebP encode
struct NoWebPCodec {
    inner: RasterCodec,
    webp_attempts: AtomicUsize,
}

impl ImageCodec for NoWebPCodec {
    fn decode(&self, artifact: &ImageArtifact) -> Result<DecodedImage, TransformError> {
        self.inner.decode(artifact)
    }

    fn encode(
        &self,
        image: &DecodedImage,
        format: ImageFormat,
        options: &EncodeOptions,
    ) -> Result<Vec<u8>, TransformError> {
        if format == ImageFormat::WebP {
            self.webp_attempts.fetch_add(1, Ordering::SeqCst);
            return Err(TransformError::encode_failed("webp", "encoder unavailable"));
        }
        self.inner.encode(image, format, options)
    }
}

#[tokio::test]
async fn test_fallback_uses_codec_capability() {
    let codec = Arc::new(NoWebPCodec {
        inner: RasterCodec::new(),
        webp_attempts: AtomicUsize::new(0),
    });
    let executor = executor("{}", "anim: { animated: true }\nstill: {}").with_codec(codec.clone());

    let gif = ImageArtifact::from_bytes(animated_gif_bytes(4, 4, 2));
    let result = executor
        .apply_with_format("anim", &gif, Some(ImageFormat::WebP))
        .await
        .unwrap();
    assert_eq!(result.format(), Some(ImageFormat::Gif));
    assert_eq!(codec.webp_attempts.load(Ordering::SeqCst), 1);

    // Without animation the failure is terminal
    let png = ImageArtifact::from_bytes(png_bytes(4, 4));
    let err = executor
        .apply_with_format("still", &png, Some(ImageFormat::WebP))
        .await
        .unwrap_err();
    assert!(matches!(err, TransformError::EncodeFailed { .. }));
}

#[tokio::test]
async fn test_filters_run_in_declared_order() {
    // Cropping first leaves a square the thumbnail can fill exactly
    let executor = executor(
        "{}",
        "crop_first: { filters: { crop: { size: [10, 10] }, thumbnail: { size: [5, 5] } } }\n\
         thumb_first: { filters: { thumbnail: { size: [5, 5] }, crop: { size: [10, 10] } } }",
    );
    let source = ImageArtifact::from_bytes(png_bytes(20, 10));

    let crop_first = executor.apply("crop_first", &source).await.unwrap();
    let decoded = RasterCodec::new().decode(&crop_first).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (5, 5));

    let thumb_first = executor.apply("thumb_first", &source).await.unwrap();
    let decoded = RasterCodec::new().decode(&thumb_first).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (5, 3));
}
