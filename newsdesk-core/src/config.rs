//! Engine configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.newsdesk/
//!   config.yaml   (optional; every key has a default)
//! ```
//!
//! # Resolution order
//!
//! built-in defaults ← `config.yaml` ← `NEWSDESK_BASE_URL` ← CLI flags.
//!
//! As with every home-relative path in this workspace, loading has an
//! explicit-home form (`load_at`) used by tests and a wrapper (`load`) that
//! derives home from `dirs::home_dir()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const BASE_URL_ENV: &str = "NEWSDESK_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_IDLE_THRESHOLD_SECS: u64 = 5 * 60;
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_EVENTS_PATH: &str = "/api/events";

/// Tunables for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsdeskConfig {
    /// Origin of the article service, without a trailing `/api`.
    pub base_url: String,
    /// Background refresh period.
    pub poll_interval_secs: u64,
    /// Idle time after which background refreshes stop.
    pub idle_threshold_secs: u64,
    /// Fixed wait between a dropped push connection and the next attempt.
    pub reconnect_delay_secs: u64,
    /// Per-request timeout for fetch and status writes (not the push stream).
    pub request_timeout_secs: u64,
    pub events_path: String,
}

impl Default for NewsdeskConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            idle_threshold_secs: DEFAULT_IDLE_THRESHOLD_SECS,
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            events_path: DEFAULT_EVENTS_PATH.to_string(),
        }
    }
}

/// `<home>/.newsdesk/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".newsdesk").join("config.yaml")
}

impl NewsdeskConfig {
    /// Load `<home>/.newsdesk/config.yaml`, or defaults when it does not exist.
    ///
    /// Returns `ConfigError::Parse` (with path + line context) if malformed.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        let path = config_path_at(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_file(&path)
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Self::load_at(&home)
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        // An empty file is a valid "all defaults" config.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.base_url = url;
        }
        self
    }

    pub fn with_process_env(self) -> Self {
        self.with_env(|key| std::env::var(key).ok())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".into()));
        }
        for (name, value) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("idle_threshold_secs", self.idle_threshold_secs),
            ("reconnect_delay_secs", self.reconnect_delay_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }
        Ok(())
    }

    /// `base_url` without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
