//! Configuration loading and validation for Windlass.
//!
//! Loads configuration from a TOML file with environment variable
//! overrides, and validates all settings before the runtime starts.
//! Loaded values feed the limit table fallback and the compactor's
//! threshold/retention knobs.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Fraction of the context limit at which proactive compaction fires.
    #[serde(default = "default_compression_threshold")]
    pub chat_compression_threshold: f64,

    /// Fraction of accumulated tokens retained after compaction.
    #[serde(default = "default_retention_ratio")]
    pub chat_compression_retention_ratio: f64,

    /// Fallback input budget for models missing from the limit table.
    #[serde(default = "default_context_limit")]
    pub default_context_limit: usize,

    /// Fallback output budget for models missing from the limit table.
    #[serde(default = "default_output_limit")]
    pub default_output_limit: usize,

    /// Model used when the caller does not name one.
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_compression_threshold() -> f64 {
    0.7
}
fn default_retention_ratio() -> f64 {
    0.3
}
fn default_context_limit() -> usize {
    131_072
}
fn default_output_limit() -> usize {
    65_536
}
fn default_model() -> String {
    "qwen3-coder-plus".into()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            chat_compression_threshold: default_compression_threshold(),
            chat_compression_retention_ratio: default_retention_ratio(),
            default_context_limit: default_context_limit(),
            default_output_limit: default_output_limit(),
            default_model: default_model(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file, apply environment overrides,
    /// and validate.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from the given path when it exists, otherwise start from
    /// defaults. Environment overrides apply either way.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            let mut config = Self::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("WINDLASS_COMPRESSION_THRESHOLD") {
            self.chat_compression_threshold = v;
        }
        if let Some(v) = env_parse("WINDLASS_RETENTION_RATIO") {
            self.chat_compression_retention_ratio = v;
        }
        if let Some(v) = env_parse("WINDLASS_DEFAULT_CONTEXT_LIMIT") {
            self.default_context_limit = v;
        }
        if let Some(v) = env_parse("WINDLASS_DEFAULT_OUTPUT_LIMIT") {
            self.default_output_limit = v;
        }
        if let Ok(v) = std::env::var("WINDLASS_DEFAULT_MODEL") {
            if !v.trim().is_empty() {
                self.default_model = v;
            }
        }
    }

    /// Validate all settings, failing fast on out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.chat_compression_threshold > 0.0 && self.chat_compression_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "chat_compression_threshold must be in (0, 1], got {}",
                self.chat_compression_threshold
            )));
        }
        if !(self.chat_compression_retention_ratio > 0.0
            && self.chat_compression_retention_ratio <= 1.0)
        {
            return Err(ConfigError::Invalid(format!(
                "chat_compression_retention_ratio must be in (0, 1], got {}",
                self.chat_compression_retention_ratio
            )));
        }
        if self.default_context_limit == 0 {
            return Err(ConfigError::Invalid(
                "default_context_limit must be at least 1".into(),
            ));
        }
        if self.default_output_limit == 0 {
            return Err(ConfigError::Invalid(
                "default_output_limit must be at least 1".into(),
            ));
        }
        if self.default_model.trim().is_empty() {
            return Err(ConfigError::Invalid("default_model must not be empty".into()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = RuntimeConfig::default();
        config.validate().unwrap();
        assert!((config.chat_compression_threshold - 0.7).abs() < f64::EPSILON);
        assert!((config.chat_compression_retention_ratio - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.default_context_limit, 131_072);
        assert_eq!(config.default_output_limit, 65_536);
    }

    #[test]
    fn load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "chat_compression_threshold = 0.5\ndefault_context_limit = 32768"
        )
        .unwrap();

        let config = RuntimeConfig::load_from_path(file.path()).unwrap();
        assert!((config.chat_compression_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.default_context_limit, 32_768);
        // Unspecified keys keep their defaults
        assert!((config.chat_compression_retention_ratio - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.default_context_limit, 131_072);
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let config = RuntimeConfig {
            chat_compression_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RuntimeConfig {
            chat_compression_threshold: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn retention_ratio_out_of_range_is_rejected() {
        let config = RuntimeConfig {
            chat_compression_retention_ratio: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = RuntimeConfig {
            default_context_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RuntimeConfig {
            default_output_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_model_is_rejected() {
        let config = RuntimeConfig {
            default_model: "  ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chat_compression_threshold = [not a number").unwrap();
        assert!(RuntimeConfig::load_from_path(file.path()).is_err());
    }
}
