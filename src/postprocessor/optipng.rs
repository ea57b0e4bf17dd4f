//! `optipng` post-processor

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::{ExternalCommand, PostProcessor};
use crate::artifact::ImageArtifact;
use crate::constants::{DEFAULT_OPTIPNG_BINARY, DEFAULT_OPTIPNG_LEVEL, DEFAULT_PROCESS_TIMEOUT_SECS};
use crate::error::TransformError;
use crate::format::ImageFormat;
use crate::options::Options;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptiPngConfig {
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Optimization level (0-7)
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default = "default_true")]
    pub strip_all: bool,
}

fn default_binary() -> PathBuf {
    PathBuf::from(DEFAULT_OPTIPNG_BINARY)
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_PROCESS_TIMEOUT_SECS
}

fn default_level() -> u32 {
    DEFAULT_OPTIPNG_LEVEL
}

fn default_true() -> bool {
    true
}

impl Default for OptiPngConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            timeout_seconds: default_timeout_seconds(),
            temp_dir: None,
            level: default_level(),
            strip_all: true,
        }
    }
}

pub struct OptiPngPostProcessor {
    command: ExternalCommand,
    defaults: OptiPngConfig,
}

impl OptiPngPostProcessor {
    pub const NAME: &'static str = "optipng";

    pub fn new(config: OptiPngConfig) -> Self {
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

    pub fn arguments(&self, options: &Options) -> Result<Vec<String>, TransformError> {
        let reader = options.reader(Self::NAME);
        let level = reader.u32_in("level", 0, 7)?.unwrap_or(self.defaults.level);
        if level > 7 {
            return Err(TransformError::invalid_option(
                Self::NAME,
                "level",
                "must be an int between 0 and 7",
            ));
        }

        let mut arguments = vec![format!("-o{}", level)];
        if reader.bool("strip_all")?.unwrap_or(self.defaults.strip_all) {
            arguments.push("-strip".to_string());
            arguments.push("all".to_string());
        }
        arguments.push("-quiet".to_string());
        Ok(arguments)
    }
}

#[async_trait]
impl PostProcessor for OptiPngPostProcessor {
    async fn process(
        &self,
        artifact: ImageArtifact,
        options: &Options,
    ) -> Result<ImageArtifact, TransformError> {
        if artifact.format() != Some(ImageFormat::Png) {
            debug!(post_processor = Self::NAME, "Skipping non-PNG artifact");
            return Ok(artifact);
        }

        let arguments = self.arguments(options)?;
        let optimized = self
            .command
            .run(artifact.content(), ".png", &arguments)
            .await?;
        Ok(artifact.with_content(optimized))
    }
}
