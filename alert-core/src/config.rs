use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::{
    client::TriggerClient,
    transport::ReqwestTransport,
    uris::{DEFAULT_API_ROOT, Uris},
};

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// api_root = "https://api.openweathermap.org/data/3.0"
/// timeout_secs = 30
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    pub api_key: Option<String>,

    /// Base URL of the Alert API; defaults to the public OpenWeatherMap endpoint.
    pub api_root: Option<String>,

    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-alerts", "alert-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = Some(api_key);
    }

    pub fn api_root(&self) -> &str {
        self.api_root.as_deref().unwrap_or(DEFAULT_API_ROOT)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Build a client over the HTTP transport, preferring `api_key_override` to the stored key.
    pub fn trigger_client(&self, api_key_override: Option<&str>) -> Result<TriggerClient> {
        let api_key = api_key_override.or(self.api_key.as_deref()).ok_or_else(|| {
            anyhow!(
                "No API key configured.\n\
                 Hint: run `alerts configure` and enter your OpenWeatherMap API key."
            )
        })?;

        let transport =
            ReqwestTransport::new(self.timeout()).context("Failed to build HTTP client")?;
        let client = TriggerClient::new(api_key, Box::new(transport))?
            .with_uris(Uris::new(self.api_root()));

        Ok(client)
    }
}
