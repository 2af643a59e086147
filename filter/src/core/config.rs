use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use super::constants::{
    CONFIG_FILE_NAME, DEFAULT_FIELD_SEPARATOR, DEFAULT_MAX_DEPTH, DEFAULT_MAX_FILTER_LENGTH,
    ENV_CONFIG, ENV_MAX_DEPTH, ENV_MAX_LENGTH, ENV_SEPARATOR, ENV_STRICT,
};
use crate::filters::TransformOptions;

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// Filter configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FilterFileConfig {
    pub separator: Option<String>,
    pub max_length: Option<usize>,
    pub max_depth: Option<usize>,
    pub strict: Option<bool>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub filter: Option<FilterFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Filter pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    /// Separator joining nested field path segments
    pub field_separator: String,
    /// Longest filter expression accepted by the parser adapter (bytes)
    pub max_filter_length: usize,
    /// Deepest logical/negation nesting accepted by the transformer
    pub max_depth: usize,
    /// Reserved transform flag; accepted but does not alter behavior
    pub strict: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            field_separator: DEFAULT_FIELD_SEPARATOR.to_string(),
            max_filter_length: DEFAULT_MAX_FILTER_LENGTH,
            max_depth: DEFAULT_MAX_DEPTH,
            strict: false,
        }
    }
}

impl FilterConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Load configuration with priority (lowest to highest):
    /// 1. Built-in defaults
    /// 2. Config file (explicit path, `ODATA_FILTER_CONFIG`, or `./odata-filter.json`)
    /// 3. Environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        tracing::debug!("Loading filter configuration");

        let config_path = match path {
            Some(path) => Some(require_existing(path.to_path_buf())?),
            None => match std::env::var(ENV_CONFIG) {
                Ok(env_path) => Some(require_existing(PathBuf::from(env_path))?),
                Err(_) => {
                    let local = PathBuf::from(CONFIG_FILE_NAME);
                    if local.exists() { Some(local) } else { None }
                }
            },
        };

        let mut config = Self::default();
        if let Some(path) = config_path {
            let file_config = FileConfig::load_from_file(&path)?;
            file_config.warn_unknown_fields();
            config = config.with_file_config(file_config);
        }

        let config = config.with_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        tracing::debug!(config = ?config, "Filter configuration loaded");
        Ok(config)
    }

    /// Layer a parsed config file over this configuration
    pub fn with_file_config(mut self, file_config: FileConfig) -> Self {
        let file_filter = file_config.filter.unwrap_or_default();
        if let Some(separator) = file_filter.separator {
            self.field_separator = separator;
        }
        if let Some(max_length) = file_filter.max_length {
            self.max_filter_length = max_length;
        }
        if let Some(max_depth) = file_filter.max_depth {
            self.max_depth = max_depth;
        }
        if let Some(strict) = file_filter.strict {
            self.strict = strict;
        }
        self
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(separator) = lookup(ENV_SEPARATOR) {
            self.field_separator = separator;
        }
        if let Some(max_length) = parse_env(&lookup, ENV_MAX_LENGTH) {
            self.max_filter_length = max_length;
        }
        if let Some(max_depth) = parse_env(&lookup, ENV_MAX_DEPTH) {
            self.max_depth = max_depth;
        }
        if let Some(strict) = lookup(ENV_STRICT) {
            match parse_bool(&strict) {
                Some(strict) => self.strict = strict,
                None => tracing::warn!(var = ENV_STRICT, value = %strict, "Ignoring invalid boolean"),
            }
        }
        self
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.field_separator.is_empty() {
            anyhow::bail!("Field separator must not be empty");
        }
        if self.max_filter_length == 0 {
            anyhow::bail!("Maximum filter length must be greater than zero");
        }
        if self.max_depth == 0 {
            anyhow::bail!("Maximum filter depth must be greater than zero");
        }
        Ok(())
    }

    /// Options handed to the filter transformer
    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            strict: self.strict,
            max_depth: self.max_depth,
            field_separator: self.field_separator.clone(),
        }
    }
}

fn require_existing(path: PathBuf) -> Result<PathBuf> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }
    Ok(path)
}

fn parse_env<F>(lookup: &F, key: &str) -> Option<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = key, value = %raw, "Ignoring invalid number");
            None
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
