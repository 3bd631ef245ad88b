//! YAML configuration
//!
//! Every section has defaults, so an empty file (or no file) is a valid
//! configuration. Command-line flags override what is loaded here.

use crate::alias::ClusterOptions;
use crate::pipeline::IngestOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; the user data directory when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Cuisine given to records synthesized from review text
    pub fallback_cuisine: Option<String>,
    /// Bulk progress interval in rows; 0 disables progress logging
    pub progress_every: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            fallback_cuisine: Some("thai".to_string()),
            progress_every: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ingest: IngestOptions,
    pub normalize: NormalizeConfig,
    pub aliases: ClusterOptions,
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse and validate a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as null, not as an empty map
        let config: Config = if text.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// `load` when a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{name} must be within 0..=1, got {value}")))
            }
        };
        unit("aliases.jaccard_threshold", self.aliases.jaccard_threshold)?;
        unit("aliases.levenshtein_threshold", self.aliases.levenshtein_threshold)?;
        if self.aliases.min_support < 0 {
            return Err(ConfigError::Invalid(format!(
                "aliases.min_support must not be negative, got {}",
                self.aliases.min_support
            )));
        }
        if self.ingest.concurrency == 0 {
            return Err(ConfigError::Invalid("ingest.concurrency must be at least 1".to_string()));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level must not be empty".to_string()));
        }
        Ok(())
    }

    /// Configured database path, or `dishdive/dishdive.db` under the user
    /// data directory.
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(default_db_path)
    }
}

/// Default database location (~/.local/share/dishdive/dishdive.db on Linux)
pub fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("dishdive").join("dishdive.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
        assert_eq!(Config::from_yaml("  \n").unwrap(), Config::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_yaml(
            "aliases:\n  jaccard_threshold: 0.6\n  phonetic: false\ningest:\n  concurrency: 8\n",
        )
        .unwrap();
        assert_eq!(config.aliases.jaccard_threshold, 0.6);
        assert!(!config.aliases.phonetic);
        assert_eq!(config.aliases.levenshtein_threshold, 0.85);
        assert_eq!(config.ingest.concurrency, 8);
        assert!(config.ingest.prefilter);
        assert_eq!(config.normalize.fallback_cuisine.as_deref(), Some("thai"));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = Config::from_yaml("aliases:\n  levenshtein_threshold: 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = Config::from_yaml("ingest:\n  concurrency: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let err = Config::from_yaml("aliases: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database:\n  path: /tmp/dd.db\nlogging:\n  level: debug").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/dd.db"));
        assert_eq!(config.logging.level, "debug");

        let missing = Config::load("/nonexistent/dishdive.yaml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn default_path_is_under_dishdive_dir() {
        let path = Config::default().database_path();
        assert!(path.ends_with("dishdive/dishdive.db"));
    }
}
