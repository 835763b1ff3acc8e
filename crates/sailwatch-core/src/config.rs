//! Sailwatch configuration system.
//!
//! TOML file at `~/.sailwatch/config.toml` with serde defaults for every
//! field, overlaid with environment variables for anything secret.
//! Credentials are never embedded as literals and never written back.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SailwatchError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SailwatchConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub booking: BookingConfig,
}

impl SailwatchConfig {
    /// Load config from the default path, then overlay secrets from the
    /// environment. A missing file yields pure defaults.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.overlay_env();
        Ok(config)
    }

    /// Load config from a specific path (no env overlay).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SailwatchError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SailwatchError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Environment always wins over the file for credentials.
    fn overlay_env(&mut self) {
        if let Ok(v) = std::env::var("SAILWATCH_CLIENT_ID") {
            self.api.client_id = v;
        }
        if let Ok(v) = std::env::var("SAILWATCH_CLIENT_SECRET") {
            self.api.client_secret = v;
        }
        if let Ok(v) = std::env::var("SAILWATCH_SCOPE") {
            self.api.scope = v;
        }
        if let Ok(v) = std::env::var("SAILWATCH_PARTNER_AUTH") {
            self.api.partner_auth = v;
        }
        if let Ok(v) = std::env::var("SAILWATCH_API_BASE_URL") {
            self.api.base_url = v;
        }
        if let Ok(v) = std::env::var("SAILWATCH_BOOKING_CMD") {
            self.booking.runner_cmd = v;
        }
    }

    /// Get the default config path (~/.sailwatch/config.toml).
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the sailwatch home directory. `SAILWATCH_HOME` overrides the
    /// default so tests and packaging can relocate all run state.
    pub fn home_dir() -> PathBuf {
        if let Ok(home) = std::env::var("SAILWATCH_HOME") {
            return PathBuf::from(shellexpand::tilde(&home).to_string());
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sailwatch")
    }
}

/// Availability source (token endpoint + sailing search) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_token_path")]
    pub token_path: String,
    #[serde(default = "default_search_path")]
    pub search_path: String,
    /// OAuth client id. Supply via SAILWATCH_CLIENT_ID.
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret. Supply via SAILWATCH_CLIENT_SECRET.
    #[serde(default)]
    pub client_secret: String,
    /// Device scope for the credential grant. Supply via SAILWATCH_SCOPE.
    #[serde(default)]
    pub scope: String,
    /// Optional partner auth header value. Supply via SAILWATCH_PARTNER_AUTH.
    #[serde(default)]
    pub partner_auth: String,
    /// Seconds shaved off the granted token lifetime before it counts as expired.
    #[serde(default = "default_token_margin")]
    pub token_margin_secs: u64,
}

fn default_base_url() -> String {
    "https://apigateway.bcferries.com".into()
}
fn default_token_path() -> String {
    "/token".into()
}
fn default_search_path() -> String {
    "/api/ex/travel/sailings/1.0/search".into()
}
fn default_token_margin() -> u64 {
    300
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_path: default_token_path(),
            search_path: default_search_path(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: String::new(),
            partner_auth: String::new(),
            token_margin_secs: default_token_margin(),
        }
    }
}

/// Monitoring defaults used when the CLI flags are absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    10
}
fn default_timeout() -> u64 {
    3600
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Downstream booking action configuration. Account credentials and
/// payment fields are not stored here; the external runner reads them
/// from its own environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// External program invoked once per booking step.
    #[serde(default)]
    pub runner_cmd: String,
    /// When true the runner must not submit payment.
    #[serde(default = "bool_true")]
    pub dry_run: bool,
    #[serde(default = "default_vehicle_height")]
    pub vehicle_height: String,
    #[serde(default = "default_vehicle_length")]
    pub vehicle_length: String,
}

fn bool_true() -> bool {
    true
}
fn default_vehicle_height() -> String {
    "under_7ft".into()
}
fn default_vehicle_length() -> String {
    "under_20ft".into()
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            runner_cmd: String::new(),
            dry_run: true,
            vehicle_height: default_vehicle_height(),
            vehicle_length: default_vehicle_length(),
        }
    }
}
