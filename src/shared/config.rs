//! Application configuration. Service endpoints, credentials, intervals.
//!
//! Read from the environment (`main` loads `.env` first), optionally layered with a file named by
//! `GLUEFORWARD_CONFIG`, then resolved into [`Settings`].

use crate::domain::{Credentials, ServiceKind};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SUCCESS_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Raw configuration as read from the environment. Every field optional; see
/// [`AppConfig::settings`] for what is required.
#[derive(Deserialize, Default)]
pub struct AppConfig {
    /// gluetun control server. Read from GLUETUN_URL.
    pub gluetun_url: Option<String>,
    /// Read from GLUETUN_API_KEY.
    #[serde(default)]
    pub gluetun_api_key: Option<String>,

    /// `qbittorrent` (default) or `slskd`. Read from SERVICE_TYPE.
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default)]
    pub service_username: Option<String>,
    #[serde(default)]
    pub service_password: Option<String>,

    // ─────────────────────────────────────────────────────────────────────────
    // Per-service fallbacks (QBITTORRENT_* / SLSKD_*)
    // ─────────────────────────────────────────────────────────────────────────
    #[serde(default)]
    pub qbittorrent_url: Option<String>,
    #[serde(default)]
    pub qbittorrent_username: Option<String>,
    #[serde(default)]
    pub qbittorrent_password: Option<String>,
    #[serde(default)]
    pub slskd_url: Option<String>,
    #[serde(default)]
    pub slskd_username: Option<String>,
    #[serde(default)]
    pub slskd_password: Option<String>,

    /// Seconds between checks after a success. Read from SUCCESS_INTERVAL.
    #[serde(default)]
    pub success_interval: Option<u64>,
    /// Seconds before retrying after a failure. Read from RETRY_INTERVAL.
    #[serde(default)]
    pub retry_interval: Option<u64>,
    /// Per-request timeout in seconds. Read from HTTP_TIMEOUT.
    #[serde(default)]
    pub http_timeout: Option<u64>,
    /// Write the port on every check even when unchanged. Read from REAPPLY_UNCHANGED.
    #[serde(default)]
    pub reapply_unchanged: Option<bool>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gluetun_url: String,
    pub gluetun_api_key: Option<String>,
    pub service: ServiceKind,
    pub service_url: String,
    pub credentials: Credentials,
    pub success_interval: Duration,
    pub retry_interval: Duration,
    pub http_timeout: Duration,
    pub reapply_unchanged: bool,
}

impl AppConfig {
    /// Read the process environment. `.env` is loaded by the caller beforehand.
    pub fn load() -> Result<Self, SettingsError> {
        Self::from_env(config::Environment::default())
    }

    /// Build from an environment source (tests pass an explicit map).
    pub fn from_env(env: config::Environment) -> Result<Self, SettingsError> {
        let mut c = config::Config::builder();
        if let Ok(path) = std::env::var("GLUEFORWARD_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        c = c.add_source(env);
        Ok(c.build()?.try_deserialize()?)
    }

    /// Resolve and validate. Missing or invalid values are reported by variable name.
    pub fn settings(&self) -> Result<Settings, SettingsError> {
        let gluetun_url =
            non_empty(&self.gluetun_url).ok_or(SettingsError::Missing("GLUETUN_URL"))?;

        let service = match non_empty(&self.service_type) {
            Some(s) => s.parse::<ServiceKind>().map_err(|reason| SettingsError::Invalid {
                name: "SERVICE_TYPE",
                reason,
            })?,
            None => ServiceKind::default(),
        };

        let (url, username, password) = match service {
            ServiceKind::Qbittorrent => (
                &self.qbittorrent_url,
                &self.qbittorrent_username,
                &self.qbittorrent_password,
            ),
            ServiceKind::Slskd => (&self.slskd_url, &self.slskd_username, &self.slskd_password),
        };
        let service_url = non_empty(&self.service_url)
            .or_else(|| non_empty(url))
            .ok_or(SettingsError::Missing("SERVICE_URL"))?;
        let username = non_empty(&self.service_username)
            .or_else(|| non_empty(username))
            .ok_or(SettingsError::Missing("SERVICE_USERNAME"))?;
        let password = non_empty(&self.service_password)
            .or_else(|| non_empty(password))
            .ok_or(SettingsError::Missing("SERVICE_PASSWORD"))?;

        Ok(Settings {
            gluetun_url,
            gluetun_api_key: non_empty(&self.gluetun_api_key),
            service,
            service_url,
            credentials: Credentials::new(username, password),
            success_interval: seconds(
                "SUCCESS_INTERVAL",
                self.success_interval,
                DEFAULT_SUCCESS_INTERVAL_SECS,
            )?,
            retry_interval: seconds(
                "RETRY_INTERVAL",
                self.retry_interval,
                DEFAULT_RETRY_INTERVAL_SECS,
            )?,
            http_timeout: seconds("HTTP_TIMEOUT", self.http_timeout, DEFAULT_HTTP_TIMEOUT_SECS)?,
            reapply_unchanged: self.reapply_unchanged.unwrap_or(false),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn seconds(name: &'static str, value: Option<u64>, default: u64) -> Result<Duration, SettingsError> {
    match value.unwrap_or(default) {
        0 => Err(SettingsError::Invalid {
            name,
            reason: "must be at least 1 second".to_string(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}
