//! Runs a stack against one source artifact
//!
//! Pipeline for one call:
//! 1. resolve the merged stack configuration
//! 2. check every filter and post-processor name against the registries
//! 3. decode, apply filters in order, encode (on a blocking thread)
//! 4. derive the output MIME type
//! 5. run post-processors in order
//!
//! Encoding to WebP with animation enabled may fail for codecs that cannot
//! write animated WebP. That case is reported as [`Export::RetryWith`] and
//! the executor re-encodes once as GIF. Every other failure aborts the run.

use std::sync::Arc;
use tracing::{debug, warn};

use super::config::{StackConfig, StackConfigResolver};
use crate::artifact::{ImageArtifact, MagicBytesGuesser, MimeTypeGuesser};
use crate::codec::{DecodedImage, EncodeOptions, ImageCodec, RasterCodec};
use crate::error::TransformError;
use crate::filter::FilterRegistry;
use crate::format::ImageFormat;
use crate::metrics::PipelineMetrics;
use crate::postprocessor::PostProcessorRegistry;

/// Format used when neither the caller, the stack nor the input names one
pub const FALLBACK_OUTPUT_FORMAT: ImageFormat = ImageFormat::Png;

/// Output format precedence: caller, stack, input, then [`FALLBACK_OUTPUT_FORMAT`]
fn target_format(
    requested: Option<ImageFormat>,
    config: &StackConfig,
    artifact: &ImageArtifact,
) -> ImageFormat {
    requested
        .or(config.format)
        .or(artifact.format())
        .unwrap_or(FALLBACK_OUTPUT_FORMAT)
}

/// Outcome of one encode attempt
#[derive(Debug)]
pub enum Export {
    /// Encoded in the requested format
    Encoded(Vec<u8>),
    /// The requested format failed in a recoverable way; encode once more as `format`
    RetryWith {
        format: ImageFormat,
        cause: TransformError,
    },
}

/// Encode `image`, classifying failures that have a fallback format
pub fn try_export(
    codec: &dyn ImageCodec,
    image: &DecodedImage,
    format: ImageFormat,
    options: &EncodeOptions,
) -> Result<Export, TransformError> {
    match codec.encode(image, format, options) {
        Ok(bytes) => Ok(Export::Encoded(bytes)),
        Err(cause) if format == ImageFormat::WebP && options.is_animated() => {
            Ok(Export::RetryWith {
                format: ImageFormat::Gif,
                cause,
            })
        }
        Err(err) => Err(err),
    }
}

/// Encode with at most one fallback; returns the bytes and their actual format
pub fn export(
    codec: &dyn ImageCodec,
    image: &DecodedImage,
    format: ImageFormat,
    options: &EncodeOptions,
) -> Result<(Vec<u8>, ImageFormat), TransformError> {
    match try_export(codec, image, format, options)? {
        Export::Encoded(bytes) => Ok((bytes, format)),
        Export::RetryWith {
            format: fallback,
            cause,
        } => {
            warn!(
                from = %format,
                to = %fallback,
                error = %cause,
                "Encode failed, retrying with fallback format"
            );
            PipelineMetrics::global().record_fallback(format.as_str(), fallback.as_str());
            let bytes = codec.encode(image, fallback, options)?;
            Ok((bytes, fallback))
        }
    }
}

/// Decode, filter and encode; runs on a blocking thread
fn render(
    codec: &dyn ImageCodec,
    filters: &FilterRegistry,
    config: &StackConfig,
    artifact: &ImageArtifact,
    target: ImageFormat,
) -> Result<(Vec<u8>, ImageFormat), TransformError> {
    let mut image = codec.decode(artifact)?;
    debug!(
        stack = %config.name,
        width = image.width(),
        height = image.height(),
        frames = image.layer_count(),
        "Decoded source image"
    );

    for (name, options) in config.filters.iter() {
        let filter = filters.get(name).ok_or_else(|| TransformError::UnknownFilterOrPostProcessor {
            filters: vec![name.to_string()],
            post_processors: Vec::new(),
        })?;
        debug!(stack = %config.name, filter = name, "Applying filter");
        // The previous handle is consumed here and dropped by the filter
        image = filter.apply(image, options)?;
    }

    let options = config.encode_options(artifact.format());
    export(codec, &image, target, &options)
}

/// Applies named stacks to artifacts
#[derive(Clone)]
pub struct StackExecutor {
    resolver: Arc<StackConfigResolver>,
    filters: Arc<FilterRegistry>,
    post_processors: Arc<PostProcessorRegistry>,
    codec: Arc<dyn ImageCodec>,
    guesser: Arc<dyn MimeTypeGuesser>,
}

impl StackExecutor {
    pub fn new(
        resolver: Arc<StackConfigResolver>,
        filters: Arc<FilterRegistry>,
        post_processors: Arc<PostProcessorRegistry>,
    ) -> Self {
        Self {
            resolver,
            filters,
            post_processors,
            codec: Arc::new(RasterCodec::new()),
            guesser: Arc::new(MagicBytesGuesser),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_guesser(mut self, guesser: Arc<dyn MimeTypeGuesser>) -> Self {
        self.guesser = guesser;
        self
    }

    pub fn resolver(&self) -> &StackConfigResolver {
        &self.resolver
    }

    /// Fail with every filter and post-processor name the registries lack
    pub fn validate(&self, config: &StackConfig) -> Result<(), TransformError> {
        let filters = self.filters.missing(config.filters.names());
        let post_processors = self.post_processors.missing(config.post_processors.names());
        if filters.is_empty() && post_processors.is_empty() {
            return Ok(());
        }
        Err(TransformError::UnknownFilterOrPostProcessor {
            filters,
            post_processors,
        })
    }

    /// Format `stack` encodes `artifact` to when the caller names none
    pub fn output_format(
        &self,
        stack: &str,
        artifact: &ImageArtifact,
    ) -> Result<ImageFormat, TransformError> {
        let config = self.resolver.resolve(stack)?;
        Ok(target_format(None, &config, artifact))
    }

    /// Apply `stack` keeping the stack's (or the input's) format
    pub async fn apply(
        &self,
        stack: &str,
        artifact: &ImageArtifact,
    ) -> Result<ImageArtifact, TransformError> {
        self.apply_with_format(stack, artifact, None).await
    }

    /// Apply `stack`, encoding to `target` when given
    ///
    /// A caller-supplied target overrides the stack's `format` so that the
    /// result matches the derivative key it will be stored under.
    pub async fn apply_with_format(
        &self,
        stack: &str,
        artifact: &ImageArtifact,
        target: Option<ImageFormat>,
    ) -> Result<ImageArtifact, TransformError> {
        let metrics = PipelineMetrics::global();
        let _timer = metrics.start_pipeline_timer(stack);

        let result = self.run(stack, artifact, target).await;
        metrics.record_pipeline(stack, result.is_ok());
        result
    }

    async fn run(
        &self,
        stack: &str,
        artifact: &ImageArtifact,
        target: Option<ImageFormat>,
    ) -> Result<ImageArtifact, TransformError> {
        let config = self.resolver.resolve(stack)?;
        self.validate(&config)?;

        let input_format = artifact.format();
        let target = target_format(target, &config, artifact);

        let (bytes, output_format) = {
            let codec = Arc::clone(&self.codec);
            let filters = Arc::clone(&self.filters);
            let config = Arc::clone(&config);
            let artifact = artifact.clone();
            tokio::task::spawn_blocking(move || {
                render(codec.as_ref(), &filters, &config, &artifact, target)
            })
            .await
            .map_err(|e| TransformError::Internal(format!("render task failed: {}", e)))??
        };

        // Format conversion invalidates the input's MIME type
        let mime_type = if Some(output_format) == input_format {
            artifact.mime_type()
        } else {
            self.guesser.guess(&bytes)
        };
        debug!(
            stack = %stack,
            format = %output_format,
            bytes = bytes.len(),
            "Encoded derivative"
        );

        let mut current = ImageArtifact::new(bytes, mime_type, Some(output_format));
        for (name, options) in config.post_processors.iter() {
            let processor = self.post_processors.get(name).ok_or_else(|| {
                TransformError::UnknownFilterOrPostProcessor {
                    filters: Vec::new(),
                    post_processors: vec![name.to_string()],
                }
            })?;
            debug!(stack = %stack, post_processor = name, "Applying post-processor");
            current = processor.process(current, options).await?;
        }

        Ok(current)
    }
}

impl std::fmt::Debug for StackExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackExecutor")
            .field("stacks", &self.resolver.names())
            .field("filters", &self.filters.names())
            .field("post_processors", &self.post_processors.names())
            .finish()
    }
}
