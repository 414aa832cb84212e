//! Configuration management with YAML support

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::classify::DEFAULT_WEEKLY_EXCEPTION_TITLE;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub sources: HashMap<String, SourceConfig>,

    #[serde(default)]
    pub classification: ClassificationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Individual transcript source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Inputs to the built-in classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Added to the built-in internal domains, never replacing them
    #[serde(default)]
    pub internal_domains: Vec<String>,

    #[serde(default = "default_weekly_exception_titles")]
    pub weekly_exception_titles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/meetroute/meetroute.db".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_weekly_exception_titles() -> Vec<String> {
    vec![DEFAULT_WEEKLY_EXCEPTION_TITLE.to_string()]
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            internal_domains: Vec::new(),
            weekly_exception_titles: default_weekly_exception_titles(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./meetroute.yaml (current directory)
    /// 3. ~/.config/meetroute/meetroute.yaml
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "meetroute.yaml".to_string(),
            shellexpand::tilde("~/.config/meetroute/meetroute.yaml").to_string(),
        ];

        for search_path in &search_paths {
            if std::path::Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)
                    .with_context(|| format!("Failed to read config {}", search_path))?;
                let config: Config = serde_yaml::from_str(&content)
                    .with_context(|| format!("Invalid config {}", search_path))?;
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.database.path).to_string();
        PathBuf::from(expanded)
    }

    /// Sources are enabled unless explicitly disabled
    pub fn is_source_enabled(&self, name: &str) -> bool {
        self.sources.get(name).map_or(true, |s| s.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.is_source_enabled("circleback"));
        assert!(config.classification.internal_domains.is_empty());
        assert_eq!(
            config.classification.weekly_exception_titles,
            vec![DEFAULT_WEEKLY_EXCEPTION_TITLE.to_string()]
        );
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
database:
  path: ~/.local/share/meetroute/test.db

sources:
  circleback:
    enabled: false

classification:
  internal_domains: [acme.io, "@corp.example"]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database.path, "~/.local/share/meetroute/test.db");
        assert!(!config.is_source_enabled("circleback"));
        assert!(config.is_source_enabled("direct"));
        assert_eq!(
            config.classification.internal_domains,
            vec!["acme.io".to_string(), "@corp.example".to_string()]
        );
        // omitted keys fall back to defaults
        assert_eq!(config.classification.weekly_exception_titles.len(), 1);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        let config = Config::load(missing.to_str().unwrap()).unwrap();
        assert!(config.is_source_enabled("direct"));
    }
}
