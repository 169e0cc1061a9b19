// src/config.rs

use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

use crate::catalog::CatalogFormat;
use crate::error::{CensusError, Result};
use crate::fetch::{Backoff, RetryPolicy};
use crate::query::DEFAULT_BASE_URL;

pub const ENV_CATALOG: &str = "CENSUSFORGE_CATALOG";
pub const ENV_BASE_URL: &str = "CENSUSFORGE_BASE_URL";
pub const ENV_DATA_DIR: &str = "CENSUSFORGE_DATA_DIR";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub base_url: String,
    pub catalog_path: PathBuf,
    pub catalog_format: CatalogFormat,
    pub data_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            catalog_path: PathBuf::from("catalog.duckdb"),
            catalog_format: CatalogFormat::Duckdb,
            data_dir: PathBuf::from("data"),
            log_file: None,
            request_timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Backoff::Exponential {
                initial: Duration::from_millis(self.initial_backoff_ms),
                max: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
            },
        )
    }
}

impl Config {
    /// Defaults, then the YAML file at `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let text = fs::read_to_string(p)?;
                Self::from_yaml(&text)?
            }
            None => Self::default(),
        };
        cfg.apply_env(|k| env::var(k).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| CensusError::Config(e.to_string()))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var(ENV_CATALOG) {
            self.catalog_path = PathBuf::from(v);
        }
        if let Some(v) = var(ENV_BASE_URL) {
            self.base_url = v;
        }
        if let Some(v) = var(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| CensusError::Config(format!("base_url `{}`: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CensusError::Config(format!(
                "base_url `{}` must be http(s)",
                self.base_url
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(CensusError::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.base_url, "https://api.census.gov/data");
        assert_eq!(cfg.retry.policy().max_attempts, 3);
    }

    #[test]
    fn yaml_overrides_defaults() {
        let cfg = Config::from_yaml(
            "catalog_path: /opt/census/database.db\n\
             catalog_format: sqlite\n\
             retry:\n  max_attempts: 5\n  initial_backoff_ms: 100\n",
        )
        .unwrap();
        assert_eq!(cfg.catalog_path, PathBuf::from("/opt/census/database.db"));
        assert_eq!(cfg.catalog_format, CatalogFormat::Sqlite);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.max_backoff_ms, 8_000);
        assert_eq!(cfg.request_timeout_secs, 30);

        let policy = cfg.retry.policy();
        assert_eq!(policy.backoff.delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff.delay(2), Duration::from_millis(200));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Config::from_yaml("catalog_pth: x.db\n"),
            Err(CensusError::Config(_))
        ));
    }

    #[test]
    fn env_wins_over_file() {
        let vars: HashMap<&str, &str> = [
            (ENV_CATALOG, "/tmp/other.duckdb"),
            (ENV_BASE_URL, "http://localhost:8080/data"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::from_yaml("catalog_path: a.duckdb\n").unwrap();
        cfg.apply_env(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.catalog_path, PathBuf::from("/tmp/other.duckdb"));
        assert_eq!(cfg.base_url, "http://localhost:8080/data");
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_bad_base_url_and_zero_attempts() {
        let mut cfg = Config {
            base_url: "not a url".into(),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
        cfg.base_url = "ftp://api.census.gov/data".into();
        assert!(cfg.validate().is_err());
        cfg.base_url = DEFAULT_BASE_URL.into();
        cfg.retry.max_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("censusforge.yaml");
        fs::write(&path, "data_dir: /srv/census\nrequest_timeout_secs: 5\n").unwrap();
        let cfg = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(cfg.request_timeout(), Duration::from_secs(5));
    }
}
