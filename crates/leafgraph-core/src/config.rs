//! Application configuration management.
//!
//! `Config` is the persisted user configuration at
//! `~/.config/leafgraph/config.json`. `ClientConfig` is what the session and
//! API client run with: persisted values, environment overrides and the
//! built-in session timings.

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::session::SESSION_VALIDITY_DAYS;

/// Application name used for config/storage directory paths
const APP_NAME: &str = "leafgraph";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Durable session storage file name
const STORAGE_FILE: &str = "storage.json";

/// API base URL used when nothing else is configured
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// Refresh this long before the access token expires.
pub const REFRESH_SAFETY_MARGIN_SECS: i64 = 60;

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Environment variable overriding the API base URL
pub const ENV_API_URL: &str = "LEAFGRAPH_API_URL";

/// Environment variable overriding the credential mode
pub const ENV_CREDENTIAL_MODE: &str = "LEAFGRAPH_CREDENTIAL_MODE";

/// How the client proves its identity to the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialMode {
    /// Bearer access token in memory, refresh token in durable storage.
    #[default]
    Bearer,
    /// Server-managed HTTP-only cookies; the client holds no tokens.
    Cookie,
}

impl std::str::FromStr for CredentialMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bearer" => Ok(CredentialMode::Bearer),
            "cookie" => Ok(CredentialMode::Cookie),
            other => Err(format!("unknown credential mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub credential_mode: Option<CredentialMode>,
    pub last_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
        } else {
            Ok(Self::default())
        }
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

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Path of the durable session storage file.
    pub fn storage_path(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find local data directory"))?;
        Ok(data_dir.join(APP_NAME).join(STORAGE_FILE))
    }

    /// Resolve the runtime configuration, letting the environment override
    /// the persisted values.
    pub fn client_config(&self) -> ClientConfig {
        let env_url = std::env::var(ENV_API_URL).ok();
        let env_mode = std::env::var(ENV_CREDENTIAL_MODE).ok();
        self.resolve(env_url, env_mode)
    }

    fn resolve(&self, env_url: Option<String>, env_mode: Option<String>) -> ClientConfig {
        let mut client = ClientConfig::default();

        if let Some(url) = env_url.or_else(|| self.api_base_url.clone()) {
            client.base_url = url;
        }

        client.credential_mode = match env_mode {
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                warn!(error = %e, "Ignoring invalid credential mode override");
                self.credential_mode.unwrap_or_default()
            }),
            None => self.credential_mode.unwrap_or_default(),
        };

        client
    }
}

/// Runtime configuration for `AuthSession` and `ApiClient`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub credential_mode: CredentialMode,
    /// Lifetime of a freshly written session descriptor.
    pub session_validity: Duration,
    /// How long before access-token expiry the refresh timer fires.
    pub refresh_margin: Duration,
    pub request_timeout: StdDuration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            credential_mode: CredentialMode::Bearer,
            session_validity: Duration::days(SESSION_VALIDITY_DAYS),
            refresh_margin: Duration::seconds(REFRESH_SAFETY_MARGIN_SECS),
            request_timeout: StdDuration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_credential_mode(mut self, mode: CredentialMode) -> Self {
        self.credential_mode = mode;
        self
    }
}
