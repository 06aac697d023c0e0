//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `mailbox.toml`.
//!     loads configuration from file or falls back to defaults, then lets the
//!     environment (or a local .env) override secrets and the port.
//!
//! structure:
//!     - ServerConfig: bind address and port.
//!     - AuthConfig: bearer token expected on uplink webhooks.
//!     - DecoderConfig: which firmware wire revision the units speak.
//!     - DashboardConfig: history length and the public link used in alerts.
//!     - AlertsConfig: cooldown window and low battery threshold.
//!     - NotifierConfig: where approved alerts are handed off.
//!     - DeviceConfig: one entry per mailbox unit (name + recipients).
//!
//! ==============================================================================

use crate::decoder::WireRevision;

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// one week
pub const MAX_COOLDOWN_MINUTES: u64 = 7 * 24 * 60;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("dashboard.history_capacity must be at least 1")]
    ZeroHistoryCapacity,
    #[error("alerts.cooldown_minutes must be at least 1")]
    ZeroCooldown,
    #[error("alerts.cooldown_minutes = {0} exceeds the maximum of one week")]
    CooldownTooLarge(u64),
    #[error("notifier.kind = \"webhook\" requires notifier.webhook_url")]
    MissingWebhookUrl,
    #[error("device id {0} is configured more than once")]
    DuplicateDevice(u8),
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct MonitorConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".to_string(), port: 3000 }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// `None` rejects every uplink
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DecoderConfig {
    #[serde(default)]
    pub revision: WireRevision,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub history_capacity: usize,
    pub public_url: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            history_capacity: crate::dashboard::DEFAULT_HISTORY_CAPACITY,
            public_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    pub cooldown_minutes: u64,
    pub low_battery_percent: u8,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: crate::alerts::DEFAULT_COOLDOWN_MINUTES,
            low_battery_percent: crate::alerts::DEFAULT_LOW_BATTERY_PERCENT,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    #[default]
    Log,
    Webhook,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    #[serde(default)]
    pub kind: NotifierKind,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    10
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            webhook_url: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub id: u8,
    pub name: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

impl MonitorConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: MonitorConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the first config file found, defaults when there is none.
    /// A file that exists but does not load is an error.
    pub fn load_or_default() -> anyhow::Result<Self> {
        Self::load_first_found(&[
            PathBuf::from("config").join("mailbox.toml"),
            PathBuf::from("..").join("config").join("mailbox.toml"),
        ])
    }

    fn load_first_found(paths: &[PathBuf]) -> anyhow::Result<Self> {
        match paths.iter().find(|path| path.exists()) {
            Some(path) => {
                let config = Self::load(path)
                    .map_err(|e| anyhow::anyhow!("{}: {:#}", path.display(), e))?;
                info!("[CONFIG] Loaded from {}", path.display());
                Ok(config)
            }
            None => {
                warn!("[CONFIG] No config file found - using defaults");
                Ok(Self::default())
            }
        }
    }

    /// environment wins over the file for secrets and deployment specifics
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(token) = var("AUTH_TOKEN").filter(|t| !t.is_empty()) {
            self.auth.token = Some(token);
        }
        if let Some(port) = var("SERVER_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("[CONFIG] Ignoring SERVER_PORT={:?}: not a valid port", port),
            }
        }
        if let Some(url) = var("PUBLIC_URL").filter(|u| !u.is_empty()) {
            self.dashboard.public_url = url;
        }
        if let Some(url) = var("WEBHOOK_URL").filter(|u| !u.is_empty()) {
            self.notifier.kind = NotifierKind::Webhook;
            self.notifier.webhook_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dashboard.history_capacity == 0 {
            return Err(ConfigError::ZeroHistoryCapacity);
        }
        if self.alerts.cooldown_minutes == 0 {
            return Err(ConfigError::ZeroCooldown);
        }
        if self.alerts.cooldown_minutes > MAX_COOLDOWN_MINUTES {
            return Err(ConfigError::CooldownTooLarge(self.alerts.cooldown_minutes));
        }
        if self.notifier.kind == NotifierKind::Webhook && self.notifier.webhook_url.is_none() {
            return Err(ConfigError::MissingWebhookUrl);
        }
        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.id) {
                return Err(ConfigError::DuplicateDevice(device.id));
            }
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Result<chrono::Duration, ConfigError> {
        let minutes = self.alerts.cooldown_minutes;
        if minutes > MAX_COOLDOWN_MINUTES {
            return Err(ConfigError::CooldownTooLarge(minutes));
        }
        i64::try_from(minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .ok_or(ConfigError::CooldownTooLarge(minutes))
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        info!("┌─────────────────────────────────────────┐");
        info!("│         MAILBOX MONITOR CONFIG          │");
        info!("├─────────────────────────────────────────┤");
        info!("│ Listen: {}:{}", self.server.bind, self.server.port);
        info!("│ Wire revision: {:?}", self.decoder.revision);
        info!("│ History: {} entries", self.dashboard.history_capacity);
        info!("│ Cooldown: {} min", self.alerts.cooldown_minutes);
        info!("│ Notifier: {:?}", self.notifier.kind);
        info!("│ Devices: {}", self.devices.len());
        let token = if self.auth.token.is_some() { "set" } else { "MISSING" };
        info!("│ Auth token: {}", token);
        info!("└─────────────────────────────────────────┘");
    }
}
