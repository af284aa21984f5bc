//! Configuration management module
//!
//! Loads and validates environment-based configuration.
//! Designed to be production-ready and easily extensible.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid number format in environment variable {0}")]
    ParseError(&'static str),

    #[error("Polling interval must be a positive number of milliseconds")]
    InvalidInterval,
}

/// Server configuration settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Device polling settings
#[derive(Debug, Clone, Deserialize)]
pub struct PollSettings {
    /// Interval in milliseconds between poll cycles
    pub interval_ms: u64,
    /// Hard timeout for the primary status call, in milliseconds
    pub status_timeout_ms: u64,
    /// Hard timeout for the secondary detail/info calls, in milliseconds
    pub detail_timeout_ms: u64,
    /// Number of synthesized points per sensor history window
    pub history_window: usize,
    /// Initially configured device addresses (host or host:port)
    pub devices: Vec<String>,
}

/// Runtime polling configuration shared between the scheduler and the
/// configuration API. A cycle always works from the snapshot it was handed
/// at start, never from a value read mid-flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub addresses: Vec<String>,
    pub interval_ms: u64,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub poll: PollSettings,
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self, SettingsError> {
        let port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .map_err(|_| SettingsError::ParseError("SERVER_PORT"))?;

        let interval_ms: u64 = env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .map_err(|_| SettingsError::ParseError("POLL_INTERVAL_MS"))?;
        if interval_ms == 0 {
            return Err(SettingsError::InvalidInterval);
        }

        let status_timeout_ms = env::var("DEVICE_STATUS_TIMEOUT_MS")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .map_err(|_| SettingsError::ParseError("DEVICE_STATUS_TIMEOUT_MS"))?;

        let detail_timeout_ms = env::var("DEVICE_DETAIL_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .map_err(|_| SettingsError::ParseError("DEVICE_DETAIL_TIMEOUT_MS"))?;

        let history_window = env::var("HISTORY_WINDOW")
            .unwrap_or_else(|_| "24".into())
            .parse()
            .map_err(|_| SettingsError::ParseError("HISTORY_WINDOW"))?;

        let devices = env::var("DEVICE_ADDRESSES")
            .unwrap_or_else(|_| "192.168.122.79".into())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            server: ServerSettings {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
                port,
            },
            poll: PollSettings {
                interval_ms,
                status_timeout_ms,
                detail_timeout_ms,
                history_window,
                devices,
            },
        })
    }

    /// The runtime polling configuration derived from these settings.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            addresses: self.poll.devices.clone(),
            interval_ms: self.poll.interval_ms,
        }
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.poll.status_timeout_ms)
    }

    pub fn detail_timeout(&self) -> Duration {
        Duration::from_millis(self.poll.detail_timeout_ms)
    }
}
