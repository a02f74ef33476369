//! Configuration management with secure storage
//!
//! Handles:
//! - Required settings from the environment (`.env` loaded first)
//! - Optional TOML tunables (intervals, timeouts, log path, lookup URL)
//! - SSH password fallback from the OS keyring
//! - Cross-platform config file location

use crate::error::ConfigError;
use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const ENV_BOT_TOKEN: &str = "TOKEN";
pub const ENV_STATUS_CHANNEL: &str = "CHANNEL_ID";
pub const ENV_LOGINS_CHANNEL: &str = "CHANNEL_ID_LOGIN";
pub const ENV_REMOTE_HOST: &str = "VPS_IP";
pub const ENV_REMOTE_USER: &str = "SSH_USERNAME";
pub const ENV_REMOTE_PASSWORD: &str = "SSH_PASSWORD";
pub const ENV_CONFIG_PATH: &str = "VPSWATCH_CONFIG";

const KEYRING_SERVICE: &str = "vpswatch-agent";
const KEYRING_ENTRY: &str = "ssh-password";

/// Credential that never shows up in logs or serialized config
#[derive(Clone, Default, PartialEq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub discord: DiscordConfig,
    pub remote: RemoteConfig,
    pub schedule: ScheduleConfig,
    pub probe: ProbeConfig,
    pub logins: LoginConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    #[serde(skip)] // Never serialize tokens
    pub bot_token: Secret,
    pub api_base: String,
    pub status_channel_id: u64,
    pub logins_channel_id: u64,
    /// Channels polled for the on-demand command; empty means the status channel
    pub command_channel_ids: Vec<u64>,
    pub command_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip)] // Never serialize passwords
    pub password: Secret,
    pub connect_timeout_secs: u64,
    pub session_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub status_interval_secs: u64,
    pub login_interval_secs: u64,
    pub command_poll_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub tail_lines: u32,
    pub auth_log_path: String,
    pub ip_lookup_url: String,
    pub self_ip_mode: SelfIpMode,
}

/// How the bot's own public IP is resolved for the login self-filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelfIpMode {
    /// Compare login lines against the looked-up address
    #[default]
    Lookup,
    /// Treat the looked-up address as an environment variable name and use its value
    EnvIndirect,
    /// Never filter by address
    Off,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: Secret::default(),
            api_base: "https://discord.com/api/v10".to_string(),
            status_channel_id: 0,
            logins_channel_id: 0,
            command_channel_ids: Vec::new(),
            command_prefix: "!".to_string(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            password: Secret::default(),
            connect_timeout_secs: 10,
            session_timeout_secs: 30,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: 5 * 60,
            login_interval_secs: 60,
            command_poll_secs: 5,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_secs: 2 }
    }
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            tail_lines: 20,
            auth_log_path: "/var/log/auth.log".to_string(),
            ip_lookup_url: "https://api64.ipify.org?format=json".to_string(),
            self_ip_mode: SelfIpMode::Lookup,
        }
    }
}

impl DiscordConfig {
    /// Channels to poll for commands
    pub fn command_channels(&self) -> Vec<u64> {
        if self.command_channel_ids.is_empty() {
            vec![self.status_channel_id]
        } else {
            self.command_channel_ids.clone()
        }
    }
}

impl WatchConfig {
    /// Load `.env`, the optional TOML file, then the environment (keyring for the SSH password)
    pub async fn load() -> Result<Self> {
        dotenvy::dotenv().ok(); // Ok si .env n'existe pas

        let config_path = Self::config_file_path()?;
        let file_content = if config_path.exists() {
            debug!("Reading config file {}", config_path.display());
            Some(
                tokio::fs::read_to_string(&config_path)
                    .await
                    .with_context(|| format!("Failed to read {}", config_path.display()))?,
            )
        } else {
            None
        };

        let config = Self::from_sources(file_content.as_deref(), |key| {
            let value = std::env::var(key).ok();
            if value.is_none() && key == ENV_REMOTE_PASSWORD {
                return Self::load_password().ok();
            }
            value
        })?;

        if config.logins.self_ip_mode != SelfIpMode::Lookup {
            warn!(
                "Self-IP login filter mode is {:?}; bot logins from its own address may be reported",
                config.logins.self_ip_mode
            );
        }

        Ok(config)
    }

    /// Build the config from TOML text plus a variable lookup (the environment in production)
    pub fn from_sources<F>(file_content: Option<&str>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: WatchConfig = match file_content {
            Some(text) if !text.trim().is_empty() => {
                toml::from_str(text).map_err(|e| ConfigError::File {
                    path: "config.toml".to_string(),
                    message: e.to_string(),
                })?
            }
            _ => WatchConfig::default(),
        };

        let required = |key: &'static str| -> Result<String, ConfigError> {
            env(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        config.discord.bot_token = Secret::new(required(ENV_BOT_TOKEN)?);
        config.discord.status_channel_id = parse_channel_id(ENV_STATUS_CHANNEL, &required(ENV_STATUS_CHANNEL)?)?;
        config.discord.logins_channel_id = parse_channel_id(ENV_LOGINS_CHANNEL, &required(ENV_LOGINS_CHANNEL)?)?;
        config.remote.host = required(ENV_REMOTE_HOST)?;
        config.remote.username = required(ENV_REMOTE_USER)?;
        config.remote.password = Secret::new(required(ENV_REMOTE_PASSWORD)?);

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("schedule.status_interval_secs", self.schedule.status_interval_secs),
            ("schedule.login_interval_secs", self.schedule.login_interval_secs),
            ("schedule.command_poll_secs", self.schedule.command_poll_secs),
            ("probe.timeout_secs", self.probe.timeout_secs),
        ];
        for (key, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.logins.tail_lines == 0 {
            return Err(ConfigError::Invalid {
                key: "logins.tail_lines",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.discord.command_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "discord.command_prefix",
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Get OS-specific config file path (`VPSWATCH_CONFIG` overrides)
    pub fn config_file_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            return Ok(PathBuf::from(path));
        }

        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("vpswatch-agent");
        path.push("config.toml");
        Ok(path)
    }

    /// Load SSH password from secure OS keyring
    fn load_password() -> Result<String> {
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_ENTRY)?;
        entry.get_password().map_err(Into::into)
    }
}

fn parse_channel_id(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|e| ConfigError::Invalid {
        key,
        message: e.to_string(),
    })
}
