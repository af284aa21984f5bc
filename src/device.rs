//! Device HTTP client
//!
//! One bounded-timeout request/response exchange per call against a single
//! field device. Devices expose three JSON endpoints: `GET /` (current
//! status, required), `GET /sensor` (detailed reading) and `GET /info`
//! (device metadata), the latter two optional and independently fallible.
//!
//! Every failure collapses into the closed [`FetchError`] taxonomy so the
//! poller can classify a device without string-matching error messages.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::models::{ConnectionStatus, DetailReading, DeviceReport, RawDeviceReading};

/// Failure classification for one device call.
///
/// A timeout is distinct from a generic error: the caller must never treat
/// "the device did not answer in time" as "the device reports zero".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("device unreachable: {0}")]
    Unreachable(String),

    #[error("device returned HTTP {0}")]
    Http(StatusCode),

    #[error("malformed device payload: {0}")]
    Parse(String),
}

impl FetchError {
    /// The connection status a sensor record gets after this failure.
    ///
    /// Timeouts and network failures mean the device is gone; an HTTP
    /// failure or garbage payload means it answered but is misbehaving.
    pub fn connection_status(&self) -> ConnectionStatus {
        match self {
            FetchError::Timeout | FetchError::Unreachable(_) => ConnectionStatus::Disconnected,
            FetchError::Http(_) | FetchError::Parse(_) => ConnectionStatus::Error,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Unreachable(err.to_string())
        }
    }
}

/// HTTP client for the device fleet.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    status_timeout: Duration,
    detail_timeout: Duration,
}

impl DeviceClient {
    /// Build a client with the given per-call timeouts.
    ///
    /// `status_timeout` bounds the primary status call; `detail_timeout`
    /// bounds the secondary `/sensor` and `/info` calls.
    pub fn new(status_timeout: Duration, detail_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            status_timeout,
            detail_timeout,
        })
    }

    /// Fetch the device's current status and latest reading (`GET /`).
    pub async fn fetch_status(&self, address: &str) -> Result<RawDeviceReading, FetchError> {
        self.get_json(address, "", self.status_timeout).await
    }

    /// Fetch the detailed current reading (`GET /sensor`).
    pub async fn fetch_detail(&self, address: &str) -> Result<DetailReading, FetchError> {
        self.get_json(address, "sensor", self.detail_timeout).await
    }

    /// Fetch the full device report (`GET /info`).
    pub async fn fetch_info(&self, address: &str) -> Result<DeviceReport, FetchError> {
        self.get_json(address, "info", self.detail_timeout).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        address: &str,
        path: &str,
        timeout: Duration,
    ) -> Result<T, FetchError> {
        let url = format!("http://{address}/{path}");
        debug!(%url, "GET device endpoint");

        let response = self
            .http
            .get(&url)
            .timeout(timeout)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(FetchError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(status));
        }

        response.json::<T>().await.map_err(|err| {
            if err.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Parse(err.to_string())
            }
        })
    }
}
