use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::proxy::KeyStrategyKind;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub origin: OriginConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Use a shared redis store instead of the in-process one
    pub redis_url: Option<String>,
    pub clear_on_startup: bool,
    pub key_strategy: KeyStrategyKind,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Values given on the command line; each one overrides the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub origin: Option<String>,
    pub redis_url: Option<String>,
    pub clear_cache: bool,
}

impl Config {
    /// Load configuration from file
    pub async fn load(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&content).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(origin) = overrides.origin {
            self.origin.url = origin;
        }
        if let Some(redis_url) = overrides.redis_url {
            self.cache.redis_url = Some(redis_url);
        }
        if overrides.clear_cache {
            self.cache.clear_on_startup = true;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be zero");
        }

        self.origin_url()?;

        if let Some(redis_url) = &self.cache.redis_url {
            if redis_url.trim().is_empty() {
                anyhow::bail!("Redis URL cannot be empty when set");
            }
        }

        Ok(())
    }

    /// Parsed origin base URL
    pub fn origin_url(&self) -> Result<Url> {
        if self.origin.url.is_empty() {
            anyhow::bail!("origin must be set (use --origin or origin.url)");
        }

        let url = Url::parse(&self.origin.url)
            .with_context(|| format!("origin must be a valid url: {}", self.origin.url))?;

        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("origin must use http or https: {}", self.origin.url);
        }
        if url.host_str().is_none() {
            anyhow::bail!("origin must include a host: {}", self.origin.url);
        }

        Ok(url)
    }
}
