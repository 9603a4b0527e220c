// Configuration for one CLI invocation.
//
// Everything a command needs is read once into a `Config` value and passed
// down explicitly; nothing is stashed in globals between commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::upload::DEFAULT_MAX_SLICE_SIZE;

const CONFIG_FILE: &str = "config.json";
const APP_DIR: &str = "storefront-publisher";

/// Environment variable that overrides the `host` from the config file.
pub const HOST_ENV: &str = "STOREFRONT_HOST";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub host: String,
    pub username: String,
    /// Prompted for interactively when absent.
    #[serde(default)]
    pub password: Option<String>,
    /// Directory holding `packages/`, `keys/` and `logs/`. Defaults to the
    /// directory the config file lives in.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_slice_size: Option<u64>,
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

impl Config {
    /// Load from `explicit`, else `./config.json`, else the per-user config
    /// directory.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => default_location()
                .with_context(|| format!("No {CONFIG_FILE} found in the current or config directory"))?,
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("Parsing config {}", path.display()))?;

        if let Ok(host) = std::env::var(HOST_ENV) {
            config.host = host;
        }
        config.host = config.host.trim_end_matches('/').to_string();
        if config.workspace.is_none() {
            config.workspace = path.parent().map(Path::to_path_buf);
        }
        tracing::debug!(path = %path.display(), host = %config.host, "configuration loaded");
        Ok(config)
    }

    pub fn workspace_dir(&self) -> PathBuf {
        match &self.workspace {
            Some(p) if !p.as_os_str().is_empty() => p.clone(),
            _ => PathBuf::from("."),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn max_slice_size(&self) -> u64 {
        self.max_slice_size.unwrap_or(DEFAULT_MAX_SLICE_SIZE)
    }
}

fn default_location() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR).join(CONFIG_FILE))
        .filter(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"host": "https://store.example.com/", "username": "dev@example.com"}"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        if std::env::var(HOST_ENV).is_err() {
            assert_eq!(config.host, "https://store.example.com");
        }
        assert_eq!(config.username, "dev@example.com");
        assert!(config.password.is_none());
        assert_eq!(config.workspace_dir(), dir.path());
        assert_eq!(config.max_slice_size(), DEFAULT_MAX_SLICE_SIZE);
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn reads_optional_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "host": "http://localhost:3001",
                "username": "dev",
                "password": "secret",
                "workspace": "/srv/publishing",
                "requestTimeoutSecs": 90,
                "maxSliceSize": 1048576
            }"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.workspace_dir(), PathBuf::from("/srv/publishing"));
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(config.max_slice_size(), 1048576);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.json"))).is_err());
    }
}
