// Configuration module

pub mod loader;
pub mod store;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::constants::{DEFAULT_WARMUP_HISTORY_LIMIT, DEFAULT_WARMUP_QUEUE_CAPACITY};
use crate::filter::{builtin_filters, FilterRegistry};
use crate::loader::{ChainLoader, LoadError};
use crate::logging::LoggingConfig;
use crate::postprocessor::{builtin_post_processors, PostProcessorRegistry, PostProcessorsConfig};
use crate::registry::RegistryError;
use crate::stack::{StackConfigResolver, StackExecutor, StackSettings};
use crate::store::ImageStore;
use crate::transformer::Transformer;

pub use loader::{LoaderConfig, LoaderKind};
pub use store::StoreConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Environment variable '{0}' is referenced but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Failed to build registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("Failed to build loader: {0}")]
    Loader(#[from] LoadError),
}

fn default_warmup_queue_capacity() -> usize {
    DEFAULT_WARMUP_QUEUE_CAPACITY
}

fn default_warmup_history_limit() -> usize {
    DEFAULT_WARMUP_HISTORY_LIMIT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupConfig {
    #[serde(default = "default_warmup_queue_capacity")]
    pub queue_capacity: usize,
    /// Finished jobs kept for status lookups
    #[serde(default = "default_warmup_history_limit")]
    pub history_limit: usize,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_warmup_queue_capacity(),
            history_limit: default_warmup_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Source loaders in priority order
    #[serde(default)]
    pub loaders: Vec<LoaderConfig>,
    /// Written as a single-key map naming the backend
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub store: StoreConfig,
    /// Settings every stack inherits
    #[serde(default)]
    pub default_filter_set_settings: StackSettings,
    /// Stack name -> settings layered over the defaults
    #[serde(default)]
    pub filter_sets: HashMap<String, StackSettings>,
    #[serde(default)]
    pub post_processors: PostProcessorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub warmup: WarmupConfig,
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, ConfigError> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| {
            ConfigError::Invalid(vec![format!("bad substitution pattern: {}", e)])
        })?;

        // Every referenced variable must be set before anything is replaced
        let mut values = HashMap::new();
        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::MissingEnvVar(var_name.to_string()))?;
            values.insert(var_name.to_string(), value);
        }

        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            values.get(&caps[1]).cloned().unwrap_or_default()
        });

        Ok(serde_yaml::from_str(&substituted)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_with_env(&yaml)
    }

    /// Check the whole document, reporting every problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.loaders.is_empty() {
            problems.push("At least one loader is required".to_string());
        }
        let mut seen_loaders = HashSet::new();
        for loader in &self.loaders {
            problems.extend(loader.problems());
            if !loader.name.trim().is_empty() && !seen_loaders.insert(loader.name.as_str()) {
                problems.push(format!("Duplicate loader name '{}'", loader.name));
            }
        }

        problems.extend(self.store.problems());

        let filters = builtin_filters()?.build();
        let post_processors = builtin_post_processors(&self.post_processors)?.build();

        problems.extend(settings_problems(
            "default_filter_set_settings",
            &self.default_filter_set_settings,
            &filters,
            &post_processors,
        ));
        let mut stack_names: Vec<&String> = self.filter_sets.keys().collect();
        stack_names.sort();
        for name in stack_names {
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                problems.push(format!(
                    "Stack name '{}' must be a single non-empty path segment",
                    name
                ));
            }
            problems.extend(settings_problems(
                &format!("Stack '{}'", name),
                &self.filter_sets[name],
                &filters,
                &post_processors,
            ));
        }

        let jpegoptim = &self.post_processors.jpegoptim;
        if matches!(jpegoptim.max, Some(max) if max > 100) {
            problems.push("jpegoptim max must be between 0 and 100".to_string());
        }
        if jpegoptim.timeout_seconds == 0 {
            problems.push("jpegoptim timeout_seconds must be > 0".to_string());
        }
        let optipng = &self.post_processors.optipng;
        if optipng.level > 7 {
            problems.push("optipng level must be between 0 and 7".to_string());
        }
        if optipng.timeout_seconds == 0 {
            problems.push("optipng timeout_seconds must be > 0".to_string());
        }
        if self.post_processors.oxipng.level > 6 {
            problems.push("oxipng level must be between 0 and 6".to_string());
        }
        if self.warmup.queue_capacity == 0 {
            problems.push("warmup queue_capacity must be > 0".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn build_loader(&self) -> Result<ChainLoader, ConfigError> {
        let mut chain = ChainLoader::new();
        for entry in &self.loaders {
            chain = chain.with_loader(entry.name.clone(), entry.build()?);
        }
        Ok(chain)
    }

    pub fn build_store(&self) -> Arc<dyn ImageStore> {
        self.store.build()
    }

    pub fn build_executor(&self) -> Result<StackExecutor, ConfigError> {
        let resolver = StackConfigResolver::new(&self.default_filter_set_settings, &self.filter_sets);
        let filters: FilterRegistry = builtin_filters()?.build();
        let post_processors: PostProcessorRegistry =
            builtin_post_processors(&self.post_processors)?.build();
        Ok(StackExecutor::new(
            Arc::new(resolver),
            Arc::new(filters),
            Arc::new(post_processors),
        ))
    }

    /// Wire loaders, stacks and store into a ready transformer
    pub fn build_transformer(&self) -> Result<Transformer, ConfigError> {
        Ok(Transformer::new(
            self.build_loader()?,
            self.build_executor()?,
            self.build_store(),
        ))
    }
}

fn settings_problems(
    context: &str,
    settings: &StackSettings,
    filters: &FilterRegistry,
    post_processors: &PostProcessorRegistry,
) -> Vec<String> {
    let mut problems = Vec::new();
    for (key, value) in [("quality", settings.quality), ("jpeg_quality", settings.jpeg_quality)] {
        if matches!(value, Some(v) if v > 100) {
            problems.push(format!("{}: {} must be between 0 and 100", context, key));
        }
    }
    if matches!(settings.png_compression_level, Some(level) if level > 9) {
        problems.push(format!(
            "{}: png_compression_level must be between 0 and 9",
            context
        ));
    }
    if let Some(names) = &settings.filters {
        let missing = filters.missing(names.names());
        if !missing.is_empty() {
            problems.push(format!("{}: unknown filters {:?}", context, missing));
        }
    }
    if let Some(names) = &settings.post_processors {
        let missing = post_processors.missing(names.names());
        if !missing.is_empty() {
            problems.push(format!("{}: unknown post-processors {:?}", context, missing));
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
loaders:
  - name: local
    filesystem:
      roots: ["/srv/images"]
store:
  memory:
    base_url: /media/cache
default_filter_set_settings:
  quality: 90
  filters:
    strip: ~
filter_sets:
  thumb:
    format: webp
    filters:
      thumbnail: { size: [120, 90], mode: outbound }
    post_processors:
      oxipng: { level: 3 }
  banner: {}
logging:
  level: debug
  format: pretty
"#;

    #[test]
    fn test_config_can_be_loaded_from_file_path() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(SAMPLE.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.loaders.len(), 1);
        assert_eq!(config.filter_sets.len(), 2);
        assert_eq!(config.default_filter_set_settings.quality, Some(90));
        assert_eq!(config.logging.level, "debug");
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/imagestack.yaml"),
            Err(ConfigError::Read(_))
        ));
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("IMAGESTACK_TEST_ROOT", "/data/images");
        let config = Config::from_yaml_with_env(
            "loaders: [{ name: local, filesystem: { roots: [\"${IMAGESTACK_TEST_ROOT}\"] } }]",
        )
        .unwrap();
        assert_eq!(
            config.loaders[0].kind,
            LoaderKind::FileSystem {
                roots: vec!["/data/images".into()]
            }
        );
    }

    #[test]
    fn test_unset_env_var_is_an_error() {
        let err = Config::from_yaml_with_env("store: { on_demand: { base_url: \"${IMAGESTACK_UNSET_VAR_XYZ}\" } }")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref name) if name == "IMAGESTACK_UNSET_VAR_XYZ"));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let config = Config::from_yaml_with_env(
            r#"
filter_sets:
  "a/b":
    quality: 101
    filters: { ghost: {} }
    post_processors: { spectre: {} }
post_processors:
  optipng: { level: 9 }
"#,
        )
        .unwrap();
        match config.validate().unwrap_err() {
            ConfigError::Invalid(problems) => {
                assert!(problems.iter().any(|p| p.contains("At least one loader")));
                assert!(problems.iter().any(|p| p.contains("single non-empty path segment")));
                assert!(problems.iter().any(|p| p.contains("quality must be")));
                assert!(problems.iter().any(|p| p.contains("ghost")));
                assert!(problems.iter().any(|p| p.contains("spectre")));
                assert!(problems.iter().any(|p| p.contains("optipng level")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_transformer() {
        let config = Config::from_yaml_with_env(SAMPLE).unwrap();
        let transformer = config.build_transformer().unwrap();
        assert_eq!(
            transformer.executor().resolver().names(),
            vec!["banner", "thumb"]
        );
        assert!(!transformer.store().supports_on_demand_creation());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_yaml_with_env("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.warmup.queue_capacity, DEFAULT_WARMUP_QUEUE_CAPACITY);
        assert_eq!(config.warmup.history_limit, DEFAULT_WARMUP_HISTORY_LIMIT);
    }
}
