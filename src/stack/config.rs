//! Stack settings and their merge into effective configurations

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::EncodeOptions;
use crate::constants::{DEFAULT_ANIMATED, DEFAULT_QUALITY};
use crate::error::TransformError;
use crate::format::ImageFormat;
use crate::options::NamedOptions;

/// Settings as written in configuration; every key optional
///
/// Used both for `default_filter_set_settings` and for each entry of
/// `filter_sets`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackSettings {
    #[serde(default)]
    pub quality: Option<u8>,
    #[serde(default)]
    pub jpeg_quality: Option<u8>,
    #[serde(default)]
    pub png_compression_level: Option<u8>,
    #[serde(default)]
    pub png_compression_filter: Option<u8>,
    #[serde(default)]
    pub format: Option<ImageFormat>,
    #[serde(default)]
    pub animated: Option<bool>,
    #[serde(default)]
    pub filters: Option<NamedOptions>,
    #[serde(default)]
    pub post_processors: Option<NamedOptions>,
}

impl StackSettings {
    /// Layer `self` over `defaults`
    ///
    /// Scalars fall back to the default only when unset here. Filter and
    /// post-processor lists are replaced wholesale, never unioned.
    pub fn merged_over(&self, defaults: &StackSettings) -> StackSettings {
        StackSettings {
            quality: self.quality.or(defaults.quality),
            jpeg_quality: self.jpeg_quality.or(defaults.jpeg_quality),
            png_compression_level: self.png_compression_level.or(defaults.png_compression_level),
            png_compression_filter: self
                .png_compression_filter
                .or(defaults.png_compression_filter),
            format: self.format.or(defaults.format),
            animated: self.animated.or(defaults.animated),
            filters: self.filters.clone().or_else(|| defaults.filters.clone()),
            post_processors: self
                .post_processors
                .clone()
                .or_else(|| defaults.post_processors.clone()),
        }
    }
}

/// Effective configuration of one stack
#[derive(Debug, Clone, PartialEq)]
pub struct StackConfig {
    pub name: String,
    pub quality: u8,
    pub jpeg_quality: Option<u8>,
    pub png_compression_level: Option<u8>,
    pub png_compression_filter: Option<u8>,
    /// Output format; `None` keeps the format of the input artifact
    pub format: Option<ImageFormat>,
    pub animated: bool,
    pub filters: NamedOptions,
    pub post_processors: NamedOptions,
}

impl StackConfig {
    pub fn from_settings(name: impl Into<String>, settings: StackSettings) -> Self {
        Self {
            name: name.into(),
            quality: settings.quality.unwrap_or(DEFAULT_QUALITY),
            jpeg_quality: settings.jpeg_quality,
            png_compression_level: settings.png_compression_level,
            png_compression_filter: settings.png_compression_filter,
            format: settings.format,
            animated: settings.animated.unwrap_or(DEFAULT_ANIMATED),
            filters: settings.filters.unwrap_or_default(),
            post_processors: settings.post_processors.unwrap_or_default(),
        }
    }

    /// Encoder settings for an input of `source_format`
    ///
    /// Optional knobs are forwarded only when configured. The animated flag
    /// is forwarded only for GIF sources.
    pub fn encode_options(&self, source_format: Option<ImageFormat>) -> EncodeOptions {
        let animated = (source_format == Some(ImageFormat::Gif) && self.animated).then_some(true);
        EncodeOptions {
            quality: self.quality,
            jpeg_quality: self.jpeg_quality,
            png_compression_level: self.png_compression_level,
            png_compression_filter: self.png_compression_filter,
            animated,
        }
    }
}

/// Resolves stack names to merged, immutable configurations
///
/// Merging happens once at construction; lookups afterwards are plain map
/// reads.
#[derive(Debug, Clone, Default)]
pub struct StackConfigResolver {
    stacks: HashMap<String, Arc<StackConfig>>,
}

impl StackConfigResolver {
    pub fn new(defaults: &StackSettings, stacks: &HashMap<String, StackSettings>) -> Self {
        let stacks = stacks
            .iter()
            .map(|(name, settings)| {
                let merged = settings.merged_over(defaults);
                (
                    name.clone(),
                    Arc::new(StackConfig::from_settings(name.clone(), merged)),
                )
            })
            .collect();
        Self { stacks }
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<StackConfig>, TransformError> {
        self.stacks
            .get(name)
            .cloned()
            .ok_or_else(|| TransformError::stack_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stacks.contains_key(name)
    }

    /// Configured stack names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stacks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<StackConfig>> {
        self.stacks.values()
    }
}
