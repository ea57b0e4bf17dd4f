//! `jpegoptim` post-processor

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::{ExternalCommand, PostProcessor};
use crate::artifact::ImageArtifact;
use crate::constants::{DEFAULT_JPEGOPTIM_BINARY, DEFAULT_PROCESS_TIMEOUT_SECS};
use crate::error::TransformError;
use crate::format::ImageFormat;
use crate::options::Options;

/// Construction defaults; per-stack options override them per call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JpegOptimConfig {
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub strip_all: bool,
    /// Maximum quality (0-100); unset leaves quality alone
    #[serde(default)]
    pub max: Option<u32>,
    #[serde(default = "default_true")]
    pub progressive: bool,
}

fn default_binary() -> PathBuf {
    PathBuf::from(DEFAULT_JPEGOPTIM_BINARY)
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_PROCESS_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

impl Default for JpegOptimConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            timeout_seconds: default_timeout_seconds(),
            temp_dir: None,
            strip_all: true,
            max: None,
            progressive: true,
        }
    }
}

pub struct JpegOptimPostProcessor {
    command: ExternalCommand,
    defaults: JpegOptimConfig,
}

impl JpegOptimPostProcessor {
    pub const NAME: &'static str = "jpegoptim";

    pub fn new(config: JpegOptimConfig) -> Self {
        let command = ExternalCommand::new(
            Self::NAME,
            config.binary.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
        .with_temp_dir(config.temp_dir.clone());
        Self {
            command,
            defaults: config,
        }
    }

    /// Command-line flags for one call
    ///
    /// `max` may also be given as `quality`.
    pub fn arguments(&self, options: &Options) -> Result<Vec<String>, TransformError> {
        let reader = options.reader(Self::NAME);
        let mut arguments = Vec::new();

        if reader.bool("strip_all")?.unwrap_or(self.defaults.strip_all) {
            arguments.push("--strip-all".to_string());
        }

        let max = match reader.u32_in("max", 0, 100)? {
            Some(max) => Some(max),
            None => reader.u32_in("quality", 0, 100)?,
        };
        if let Some(max) = max.or(self.defaults.max) {
            if max > 100 {
                return Err(TransformError::invalid_option(
                    Self::NAME,
                    "max",
                    "must be an int between 0 and 100",
                ));
            }
            arguments.push(format!("--max={}", max));
        }

        if reader.bool("progressive")?.unwrap_or(self.defaults.progressive) {
            arguments.push("--all-progressive".to_string());
        } else {
            arguments.push("--all-normal".to_string());
        }

        Ok(arguments)
    }
}

#[async_trait]
impl PostProcessor for JpegOptimPostProcessor {
    async fn process(
        &self,
        artifact: ImageArtifact,
        options: &Options,
    ) -> Result<ImageArtifact, TransformError> {
        if artifact.format() != Some(ImageFormat::Jpeg) {
            debug!(post_processor = Self::NAME, "Skipping non-JPEG artifact");
            return Ok(artifact);
        }

        let arguments = self.arguments(options)?;
        let optimized = self
            .command
            .run(artifact.content(), ".jpg", &arguments)
            .await?;
        Ok(artifact.with_content(optimized))
    }
}
