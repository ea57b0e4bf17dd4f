//! Post-processors operating on encoded bytes
//!
//! Post-processors run after export, in the order a stack declares them.
//! Each one guards on content type: input it does not apply to passes
//! through unchanged. Anything else that goes wrong (a tool exiting
//! non-zero, a timeout) fails the pipeline instead of silently keeping the
//! unoptimized bytes.

pub mod external;
pub mod jpegoptim;
pub mod optipng;
pub mod oxipng;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::artifact::ImageArtifact;
use crate::error::TransformError;
use crate::options::Options;
use crate::registry::{Registry, RegistryBuilder, RegistryError};

pub use external::ExternalCommand;
pub use jpegoptim::{JpegOptimConfig, JpegOptimPostProcessor};
pub use optipng::{OptiPngConfig, OptiPngPostProcessor};
pub use self::oxipng::{OxiPngConfig, OxiPngPostProcessor};

/// Rewrites an encoded artifact
#[async_trait]
pub trait PostProcessor: Send + Sync {
    async fn process(
        &self,
        artifact: ImageArtifact,
        options: &Options,
    ) -> Result<ImageArtifact, TransformError>;
}

pub type PostProcessorRegistry = Registry<dyn PostProcessor>;

/// Construction settings of the built-in post-processors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostProcessorsConfig {
    #[serde(default)]
    pub jpegoptim: JpegOptimConfig,
    #[serde(default)]
    pub optipng: OptiPngConfig,
    #[serde(default)]
    pub oxipng: OxiPngConfig,
}

/// Builder pre-populated with every built-in post-processor
pub fn builtin_post_processors(
    config: &PostProcessorsConfig,
) -> Result<RegistryBuilder<dyn PostProcessor>, RegistryError> {
    PostProcessorRegistry::builder("post-processor")
        .register(
            JpegOptimPostProcessor::NAME,
            Arc::new(JpegOptimPostProcessor::new(config.jpegoptim.clone())),
        )?
        .register(
            OptiPngPostProcessor::NAME,
            Arc::new(OptiPngPostProcessor::new(config.optipng.clone())),
        )?
        .register(
            OxiPngPostProcessor::NAME,
            Arc::new(OxiPngPostProcessor::new(config.oxipng.clone())),
        )
}
