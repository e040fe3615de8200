//! Configuration file support for arbolado
//!
//! Reads `arbolado.toml` (or the file given with `--config`), then applies
//! environment overrides. `DATABASE_URL` always wins over the file, and a
//! `.env` file in the working directory is honoured.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for when no explicit config path is given
pub const CONFIG_FILE_NAME: &str = "arbolado.toml";

/// Environment variable holding the database connection string
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// List endpoint paging
    #[serde(default)]
    pub pagination: PaginationConfig,
}

/// Database-related configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// Connection string: a file path, optionally prefixed with `sqlite://`
    /// Default: "arbolado.db"
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a connection waits on a locked database file
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Threads pulling requests off the listener
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PaginationConfig {
    /// Page size used when a list request has no `limit`
    #[serde(default = "default_limit")]
    pub default_limit: i64,

    /// Upper bound applied to any requested `limit`
    #[serde(default = "default_max_limit")]
    pub max_limit: i64,
}

fn default_database_url() -> String {
    "arbolado.db".to_string()
}

fn default_pool_size() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u32 {
    5_000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_workers() -> usize {
    4
}

fn default_limit() -> i64 {
    100
}

fn default_max_limit() -> i64 {
    1000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl PaginationConfig {
    /// Resolve a requested page size against the configured bounds
    pub fn clamp_limit(&self, requested: Option<i64>) -> i64 {
        let max = self.max_limit.max(1);
        requested.unwrap_or(self.default_limit).clamp(1, max)
    }
}

impl Config {
    /// Load config from an explicit file, or from `arbolado.toml` found by
    /// walking up from the working directory. Environment overrides are
    /// applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => Self::find_config_path(),
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        dotenvy::dotenv().ok();
        config.apply_env(std::env::var(DATABASE_URL_ENV).ok());
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override the database connection string when one is provided
    pub fn apply_env(&mut self, database_url: Option<String>) {
        if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
            self.database.url = url;
        }
    }

    /// Find arbolado.toml by walking up directory tree
    fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.url, "arbolado.db");
        assert_eq!(config.database.pool_size, 5);
        assert_eq!(config.bind_address(), "127.0.0.1:8000");
        assert_eq!(config.pagination.default_limit, 100);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
url = "sqlite:///var/lib/arbolado/census.db"

[server]
port = 9090
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.url, "sqlite:///var/lib/arbolado/census.db");
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.pagination, PaginationConfig::default());
    }

    #[test]
    fn test_env_overrides_database_url() {
        let mut config = Config::default();
        config.apply_env(Some("census.db".to_string()));
        assert_eq!(config.database.url, "census.db");

        config.apply_env(Some("   ".to_string()));
        assert_eq!(config.database.url, "census.db");

        config.apply_env(None);
        assert_eq!(config.database.url, "census.db");
    }

    #[test]
    fn test_clamp_limit() {
        let paging = PaginationConfig {
            default_limit: 50,
            max_limit: 200,
        };
        assert_eq!(paging.clamp_limit(None), 50);
        assert_eq!(paging.clamp_limit(Some(0)), 1);
        assert_eq!(paging.clamp_limit(Some(-4)), 1);
        assert_eq!(paging.clamp_limit(Some(500)), 200);
        assert_eq!(paging.clamp_limit(Some(120)), 120);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[server]\nport = \"not a number\"\n").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
