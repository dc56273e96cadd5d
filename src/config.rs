//! Configuration management for obs-remote

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server connection settings
    #[serde(default)]
    pub obs: ObsConfig,

    /// Reconciliation timers and automation
    #[serde(default)]
    pub session: SessionConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObsConfig {
    /// WebSocket host
    #[serde(default = "default_host")]
    pub host: String,

    /// WebSocket port
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket password, if authentication is enabled on the server
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Switching to this scene unmutes the mic, any other scene mutes it
    #[serde(default = "default_trigger_scene")]
    pub trigger_scene: String,

    /// Delay before the mic follows a scene switch (ms)
    #[serde(default = "default_mic_switch_delay")]
    pub mic_switch_delay_ms: u64,

    /// Audio level refresh interval (ms)
    #[serde(default = "default_volume_poll_interval")]
    pub volume_poll_interval_ms: u64,

    /// Upper bound on every request round-trip (ms)
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,
}

// Default value functions
fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    4455
}

fn default_trigger_scene() -> String {
    "Game".to_string()
}

fn default_mic_switch_delay() -> u64 {
    1000
}

fn default_volume_poll_interval() -> u64 {
    1000
}

fn default_call_timeout() -> u64 {
    5000
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            trigger_scene: default_trigger_scene(),
            mic_switch_delay_ms: default_mic_switch_delay(),
            volume_poll_interval_ms: default_volume_poll_interval(),
            call_timeout_ms: default_call_timeout(),
        }
    }
}

impl ObsConfig {
    /// `host:port`, for logs and errors
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl SessionConfig {
    pub fn mic_switch_delay(&self) -> Duration {
        Duration::from_millis(self.mic_switch_delay_ms)
    }

    pub fn volume_poll_interval(&self) -> Duration {
        // A zero interval would make the poller spin
        Duration::from_millis(self.volume_poll_interval_ms.max(1))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path()?)
    }

    /// Load configuration from `config_path`, writing defaults there if it does not exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path.to_path_buf());
            Ok(config)
        } else {
            let config = Config {
                config_path: Some(config_path.to_path_buf()),
                ..Config::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "obs-remote", "obs-remote")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}
