// ABOUTME: Configuration management for the stagehand application
// ABOUTME: Loads defaults for home, parallelism, locking, and logging from a YAML file

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_home")]
    pub home: PathBuf,

    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    #[serde(default)]
    pub fail_fast: bool,

    #[serde(default = "default_lock_stale_sec")]
    pub lock_stale_sec: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

fn default_home() -> PathBuf {
    PathBuf::from(".stagehand")
}

fn default_max_parallel() -> usize {
    4
}

fn default_lock_stale_sec() -> u64 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home: default_home(),
            max_parallel: default_max_parallel(),
            fail_fast: false,
            lock_stale_sec: default_lock_stale_sec(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit path or the standard locations.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => match Self::find_config_file() {
                Some(p) => p,
                None => return Ok(Config::default()),
            },
        };

        let contents = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    fn find_config_file() -> Option<PathBuf> {
        ["stagehand.yaml", "stagehand.yml", ".stagehand.yaml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.home, PathBuf::from(".stagehand"));
        assert_eq!(config.max_parallel, 4);
        assert!(!config.fail_fast);
        assert_eq!(config.lock_stale_sec, 3600);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stagehand.yaml");
        std::fs::write(
            &path,
            "home: /var/stagehand\nmax_parallel: 8\nlogging:\n  level: debug\n  format: compact\n",
        )
        .unwrap();

        let config = Config::load(Some(path)).unwrap();
        assert_eq!(config.home, PathBuf::from("/var/stagehand"));
        assert_eq!(config.max_parallel, 8);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "compact");
        // Unset fields keep their defaults
        assert_eq!(config.lock_stale_sec, 3600);
    }

    #[test]
    fn test_missing_explicit_file_errors() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(dir.path().join("nope.yaml"))).is_err());
    }
}
