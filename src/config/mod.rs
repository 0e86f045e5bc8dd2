//! Configuration management for shopchat

use crate::api::ClientError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable pointing at an alternate config file
pub const CONFIG_ENV: &str = "SHOPCHAT_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend base URL, e.g. `http://localhost:8000`
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Pre-supplied access token; skips the login exchange
    pub token: Option<String>,
    /// Override for the credential file location
    pub credentials_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueryConfig {
    /// Category applied when a query names none
    pub category: Option<String>,
    pub default_limit: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            category: None,
            default_limit: 10,
        }
    }
}

impl Config {
    /// Load configuration from default location (or `$SHOPCHAT_CONFIG`),
    /// then apply environment overrides
    pub fn load() -> Result<Self> {
        let config_path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => Self::config_path()?,
        };

        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load a config file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "shopchat") {
            let config_dir = proj_dirs.config_dir();
            std::fs::create_dir_all(config_dir)?;
            Ok(config_dir.join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Apply `SHOPCHAT_*` overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(base_url) = get("SHOPCHAT_API_BASE") {
            self.api.base_url = base_url;
        }
        if let Some(username) = get("SHOPCHAT_USERNAME") {
            self.auth.username = Some(username);
        }
        if let Some(password) = get("SHOPCHAT_PASSWORD") {
            self.auth.password = Some(password);
        }
        if let Some(token) = get("SHOPCHAT_TOKEN") {
            self.auth.token = Some(token);
        }
    }

    /// Validated API base URL without a trailing slash
    pub fn api_base(&self) -> Result<String, ClientError> {
        let raw = self.api.base_url.trim();
        if raw.is_empty() {
            return Err(ClientError::Configuration(
                "API base URL is not configured (set [api] base_url or SHOPCHAT_API_BASE)"
                    .to_string(),
            ));
        }

        let parsed = url::Url::parse(raw).map_err(|e| {
            ClientError::Configuration(format!("invalid API base URL '{}': {}", raw, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Configuration(format!(
                "API base URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        Ok(raw.trim_end_matches('/').to_string())
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        self.api_base()?;
        if self.query.default_limit == 0 {
            return Err(ClientError::Configuration(
                "query.default_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.query.default_limit, 10);
        assert!(config.api.base_url.is_empty());
        assert!(config.auth.token.is_none());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [api]
            base_url = "http://localhost:8000/"

            [query]
            category = "rings"
            "#,
        )
        .unwrap();

        assert_eq!(config.api_base().unwrap(), "http://localhost:8000");
        assert_eq!(config.query.category.as_deref(), Some("rings"));
        assert_eq!(config.query.default_limit, 10);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SHOPCHAT_API_BASE", "https://shop.example.com"),
            ("SHOPCHAT_USERNAME", "ana"),
            ("SHOPCHAT_PASSWORD", "secret"),
            ("SHOPCHAT_TOKEN", "   "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.auth.token = Some("from-file".into());
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api.base_url, "https://shop.example.com");
        assert_eq!(config.auth.username.as_deref(), Some("ana"));
        assert_eq!(config.auth.password.as_deref(), Some("secret"));
        // Blank values do not override
        assert_eq!(config.auth.token.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_api_base_validation() {
        let mut config = Config::default();
        assert!(matches!(
            config.api_base(),
            Err(ClientError::Configuration(_))
        ));

        config.api.base_url = "ftp://shop.example.com".into();
        assert!(config.validate().is_err());

        config.api.base_url = "not a url".into();
        assert!(config.validate().is_err());

        config.api.base_url = "https://shop.example.com/api/".into();
        assert_eq!(config.api_base().unwrap(), "https://shop.example.com/api");

        config.query.default_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api\nbase_url = 1").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
