//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the API base address, session routes, renewal timing and the
//! last email used to log in.
//!
//! Configuration is stored at `~/.config/coursebook/config.json`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "coursebook";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend address used when nothing is configured.
const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

/// Renew the access token this many seconds before it expires.
const DEFAULT_RENEWAL_LEAD_SECS: u64 = 5 * 60;

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const ENV_API_BASE_URL: &str = "COURSEBOOK_API_BASE_URL";
const ENV_TOKEN_STORAGE: &str = "COURSEBOOK_TOKEN_STORAGE";

/// Where the token pair is persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for TokenStorage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(TokenStorage::File),
            "keyring" => Ok(TokenStorage::Keyring),
            "memory" => Ok(TokenStorage::Memory),
            other => Err(anyhow::anyhow!("Unknown token storage: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub login_route: String,
    pub home_route: String,
    pub renewal_lead_secs: u64,
    pub request_timeout_secs: u64,
    pub token_storage: TokenStorage,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            login_route: "/login".to_string(),
            home_route: "/".to_string(),
            renewal_lead_secs: DEFAULT_RENEWAL_LEAD_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_storage: TokenStorage::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Override fields from `COURSEBOOK_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_BASE_URL) {
            if !url.trim().is_empty() {
                self.api_base_url = url;
            }
        }
        if let Ok(value) = std::env::var(ENV_TOKEN_STORAGE) {
            match value.parse() {
                Ok(storage) => self.token_storage = storage,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_TOKEN_STORAGE),
            }
        }
    }

    /// Build a full endpoint URL from a path like `/courses/featured/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn renewal_lead(&self) -> Duration {
        Duration::from_secs(self.renewal_lead_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:8000/api");
        assert_eq!(config.login_route, "/login");
        assert_eq!(config.renewal_lead(), Duration::from_secs(300));
        assert_eq!(config.token_storage, TokenStorage::File);
    }

    #[test]
    fn test_endpoint_joins_slashes() {
        let mut config = Config::default();
        assert_eq!(
            config.endpoint("/token/refresh/"),
            "http://localhost:8000/api/token/refresh/"
        );

        config.api_base_url = "https://learn.example.com/api/".to_string();
        assert_eq!(
            config.endpoint("courses/featured/"),
            "https://learn.example.com/api/courses/featured/"
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_base_url": "http://api.test", "token_storage": "keyring"}"#)
                .expect("Failed to parse partial config");
        assert_eq!(config.api_base_url, "http://api.test");
        assert_eq!(config.token_storage, TokenStorage::Keyring);
        assert_eq!(config.renewal_lead_secs, 300);
        assert_eq!(config.home_route, "/");
    }

    #[test]
    fn test_token_storage_from_str() {
        assert_eq!("file".parse::<TokenStorage>().unwrap(), TokenStorage::File);
        assert_eq!(" Keyring ".parse::<TokenStorage>().unwrap(), TokenStorage::Keyring);
        assert_eq!("MEMORY".parse::<TokenStorage>().unwrap(), TokenStorage::Memory);
        assert!("redis".parse::<TokenStorage>().is_err());
    }
}
