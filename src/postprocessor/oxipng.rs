//! In-process PNG optimization with the `oxipng` crate

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::PostProcessor;
use crate::artifact::ImageArtifact;
use crate::constants::DEFAULT_OXIPNG_LEVEL;
use crate::error::TransformError;
use crate::format::ImageFormat;
use crate::options::Options;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OxiPngConfig {
    /// Preset level (0-6)
    #[serde(default = "default_level")]
    pub level: u8,
    #[serde(default = "default_true")]
    pub strip_all: bool,
}

fn default_level() -> u8 {
    DEFAULT_OXIPNG_LEVEL
}

fn default_true() -> bool {
    true
}

impl Default for OxiPngConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            strip_all: true,
        }
    }
}

pub struct OxiPngPostProcessor {
    defaults: OxiPngConfig,
}

impl OxiPngPostProcessor {
    pub const NAME: &'static str = "oxipng";

    pub fn new(config: OxiPngConfig) -> Self {
        Self { defaults: config }
    }

    fn options(&self, options: &Options) -> Result<::oxipng::Options, TransformError> {
        let reader = options.reader(Self::NAME);
        let level = match reader.u32_in("level", 0, 6)? {
            Some(level) => level as u8,
            None => self.defaults.level.min(6),
        };

        let mut oxi = ::oxipng::Options::from_preset(level);
        if reader.bool("strip_all")?.unwrap_or(self.defaults.strip_all) {
            oxi.strip = ::oxipng::StripChunks::Safe;
        }
        Ok(oxi)
    }
}

#[async_trait]
impl PostProcessor for OxiPngPostProcessor {
    async fn process(
        &self,
        artifact: ImageArtifact,
        options: &Options,
    ) -> Result<ImageArtifact, TransformError> {
        if artifact.format() != Some(ImageFormat::Png) {
            return Ok(artifact);
        }

        let oxi = self.options(options)?;
        let input = artifact.content().clone();
        // CPU-bound; keep it off the async workers
        let optimized = tokio::task::spawn_blocking(move || {
            ::oxipng::optimize_from_memory(&input, &oxi)
        })
        .await
        .map_err(|e| TransformError::Internal(format!("oxipng task failed: {}", e)))?
        .map_err(|e| TransformError::external_process(Self::NAME, e.to_string()))?;

        Ok(artifact.with_content(optimized))
    }
}
