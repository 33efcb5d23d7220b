use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::access::{AccessControl, OpenAccess, WorkspaceGrant, WorkspacePolicy};
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = ".schemata/config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub busy_timeout_ms: u64,
    pub page_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            page_size: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreConfig,
    pub retry: RetryPolicy,
    pub workspaces: Vec<WorkspaceGrant>,
}

impl Config {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config = Self::parse(&raw).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    fn validate(&self) -> Result<(), String> {
        if self.store.page_size == 0 {
            return Err("store.page_size must be at least 1".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        for grant in &self.workspaces {
            if grant.id.trim().is_empty() || grant.environment.trim().is_empty() {
                return Err("every [[workspaces]] entry needs an id and an environment".to_string());
            }
        }
        Ok(())
    }

    /// Open access unless workspaces are declared.
    pub fn access_control(&self) -> Box<dyn AccessControl> {
        if self.workspaces.is_empty() {
            Box::new(OpenAccess)
        } else {
            Box::new(WorkspacePolicy::new(&self.workspaces))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::{Config, ConfigError};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("schemata-config-{}-{}", Uuid::now_v7(), name))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(&temp_path("absent.toml")).expect("missing file should be fine");
        assert_eq!(config, Config::default());
        assert_eq!(config.store.page_size, 10);
        assert_eq!(config.store.busy_timeout_ms, 5000);
        assert_eq!(config.retry.max_attempts, 4);
        assert!(config
            .access_control()
            .assert_can_modify_schema("anyone", "S-1", "W-1")
            .is_ok());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::parse(
            r#"
[store]
page_size = 25

[retry]
max_backoff_ms = 100

[[workspaces]]
id = "W-sales"
environment = "E-acme"
members = ["bob"]
admins = ["alice"]
"#,
        )
        .expect("config should parse");
        assert_eq!(config.store.page_size, 25);
        assert_eq!(config.store.busy_timeout_ms, 5000);
        assert_eq!(config.retry.max_backoff_ms, 100);
        assert_eq!(config.retry.initial_backoff_ms, 20);
        assert_eq!(config.workspaces.len(), 1);

        let access = config.access_control();
        assert!(access.assert_can_modify_schema("alice", "S-1", "W-sales").is_ok());
        assert!(access.assert_can_modify_schema("bob", "S-1", "W-sales").is_err());
    }

    #[test]
    fn invalid_files_report_their_path() {
        let path = temp_path("bad.toml");
        std::fs::write(&path, "[store]\npage_size = 0\n").expect("config should be writable");
        let err = Config::load(&path).expect_err("zero page size should be rejected");
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("page_size"));

        std::fs::write(&path, "[store\n").expect("config should be writable");
        let err = Config::load(&path).expect_err("broken toml should be rejected");
        assert!(matches!(err, ConfigError::Toml { .. }));

        std::fs::write(&path, "[unknown]\nkey = 1\n").expect("config should be writable");
        assert!(Config::load(&path).is_err());
        let _ = std::fs::remove_file(path);
    }
}
