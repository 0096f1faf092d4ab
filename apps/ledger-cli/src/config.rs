//! # CLI Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Command-line flags (highest priority)                              │
//! │     --db ./ledger.db --owner u-1 --organization pharmacy-1             │
//! │                                                                         │
//! │  2. Environment Variables                                              │
//! │     REMEDY_DB_PATH, REMEDY_OWNER_ID, REMEDY_ORGANIZATION_ID,           │
//! │     REMEDY_MAX_CONFLICT_RETRIES, REMEDY_LOG                            │
//! │                                                                         │
//! │  3. TOML Config File                                                   │
//! │     --config <path>, or                                                │
//! │     ~/.config/remedy-pos/ledger.toml (Linux)                           │
//! │     ~/Library/Application Support/com.remedy.remedy-pos/ledger.toml    │
//! │                                                                         │
//! │  4. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/remedy/ledger.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [scope]
//! owner_id = "u-1"
//! organization_id = "pharmacy-1"   # optional
//!
//! [funding]
//! max_conflict_retries = 3
//!
//! [logging]
//! filter = "info,remedy=debug,sqlx=warn"
//! ```

use remedy_core::FundingScope;
use remedy_db::DbConfig;
use remedy_funding::FundingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_LOG_FILTER: &str = "info,remedy=debug,sqlx=warn";

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "remedy", "remedy-pos")
        .map(|dirs| dirs.data_dir().join("ledger.db"))
        .unwrap_or_else(|| PathBuf::from("ledger.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for DatabaseSection {
    fn default() -> Self {
        DatabaseSection {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Who the operator acts as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSection {
    #[serde(default)]
    pub owner_id: String,

    #[serde(default)]
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection {
            filter: default_log_filter(),
        }
    }
}

// =============================================================================
// CLI Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub scope: ScopeSection,

    #[serde(default)]
    pub funding: FundingConfig,

    #[serde(default)]
    pub logging: LoggingSection,
}

impl CliConfig {
    /// Defaults, then the config file (if any), then the environment.
    ///
    /// An explicit `config_path` must exist; the platform default may not.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading ledger config");
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// `ledger.toml` in the platform config directory.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "remedy", "remedy-pos").map(|dirs| dirs.config_dir().join("ledger.toml"))
    }

    /// Applies `REMEDY_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("REMEDY_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(owner) = lookup("REMEDY_OWNER_ID") {
            self.scope.owner_id = owner;
        }
        if let Some(org) = lookup("REMEDY_ORGANIZATION_ID") {
            self.scope.organization_id = Some(org).filter(|o| !o.is_empty());
        }
        if let Some(retries) = lookup("REMEDY_MAX_CONFLICT_RETRIES") {
            self.funding.max_conflict_retries = retries.parse().map_err(|_| ConfigError::InvalidValue {
                key: "REMEDY_MAX_CONFLICT_RETRIES".to_string(),
                value: retries.clone(),
            })?;
        }
        if let Some(filter) = lookup("REMEDY_LOG") {
            self.logging.filter = filter;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scope.owner_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "owner id is required (--owner, REMEDY_OWNER_ID or [scope] owner_id)".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn scope(&self) -> FundingScope {
        let scope = FundingScope::new(&self.scope.owner_id);
        match &self.scope.organization_id {
            Some(org) => scope.with_organization(org),
            None => scope,
        }
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CliConfig::default();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.funding.max_conflict_retries, 3);
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_partial_file() {
        let toml_str = r#"
            [scope]
            owner_id = "u-1"
            organization_id = "pharmacy-1"

            [funding]
            max_conflict_retries = 7
        "#;
        let config: CliConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scope.owner_id, "u-1");
        assert_eq!(config.funding.max_conflict_retries, 7);
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(
            config.scope(),
            FundingScope::new("u-1").with_organization("pharmacy-1")
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        std::fs::write(&path, "[database]\npath = \"/tmp/x.db\"\n").unwrap();

        let config = CliConfig::from_file(&path).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/x.db"));

        let missing = CliConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = CliConfig::default();
        config
            .apply_env_overrides(env(&[
                ("REMEDY_DB_PATH", "/data/ledger.db"),
                ("REMEDY_OWNER_ID", "u-9"),
                ("REMEDY_ORGANIZATION_ID", "pharmacy-2"),
                ("REMEDY_MAX_CONFLICT_RETRIES", "10"),
                ("REMEDY_LOG", "debug"),
            ]))
            .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/data/ledger.db"));
        assert_eq!(config.scope.owner_id, "u-9");
        assert_eq!(config.scope.organization_id.as_deref(), Some("pharmacy-2"));
        assert_eq!(config.funding.max_conflict_retries, 10);
        assert_eq!(config.logging.filter, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_retry_count_is_rejected() {
        let mut config = CliConfig::default();
        let err = config
            .apply_env_overrides(env(&[("REMEDY_MAX_CONFLICT_RETRIES", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_zero_connections_is_invalid() {
        let mut config = CliConfig::default();
        config.scope.owner_id = "u-1".into();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
