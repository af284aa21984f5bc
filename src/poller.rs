//! Concurrent device polling
//!
//! Fans one status fetch out per configured address, waits for every outcome
//! (success or failure), and maps each into a per-device [`Sensor`] record.
//! One slow or dead device never blocks the others and never aborts the
//! cycle; the join point is bounded by the per-call timeout, so a full cycle
//! costs max(timeout) rather than sum(timeout) regardless of fleet size.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::device::{DeviceClient, FetchError};
use crate::history;
use crate::models::{
    ConnectionStatus, GeoPoint, HistorySource, RawDeviceReading, Reading, Sensor,
};

/// Classified outcome of one poll attempt, for the debug event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    Connected,
    Timeout,
    Unreachable,
    HttpError,
    ParseError,
}

impl From<&FetchError> for PollOutcome {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::Timeout => PollOutcome::Timeout,
            FetchError::Unreachable(_) => PollOutcome::Unreachable,
            FetchError::Http(_) => PollOutcome::HttpError,
            FetchError::Parse(_) => PollOutcome::ParseError,
        }
    }
}

/// One entry of the rolling poll-attempt log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollEvent {
    pub timestamp: DateTime<Utc>,
    pub address: String,
    pub outcome: PollOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

/// Poll every address concurrently and return one Sensor per address.
///
/// The address list is the caller's snapshot for this cycle; mutating the
/// configured fleet mid-cycle does not affect an in-flight poll. An empty
/// list yields an empty map, not an error.
pub async fn poll_all(
    client: &DeviceClient,
    addresses: &[String],
    window: usize,
) -> (BTreeMap<String, Sensor>, Vec<PollEvent>) {
    let polls = addresses.iter().map(|address| poll_device(client, address, window));

    let mut sensors = BTreeMap::new();
    let mut events = Vec::with_capacity(addresses.len());
    for (sensor, event) in future::join_all(polls).await {
        sensors.insert(sensor.address.clone(), sensor);
        events.push(event);
    }

    (sensors, events)
}

/// Poll one device and absorb any failure into the returned Sensor.
async fn poll_device(client: &DeviceClient, address: &str, window: usize) -> (Sensor, PollEvent) {
    let started = Instant::now();
    debug!(address, "polling device");

    let (sensor, outcome, detail) = match client.fetch_status(address).await {
        Ok(raw) => {
            let sensor = enrich(client, address, raw, window).await;
            (sensor, PollOutcome::Connected, None)
        }
        Err(err) => {
            warn!(address, error = %err, "device poll failed");
            let sensor = Sensor::unavailable(address, err.connection_status());
            let outcome = PollOutcome::from(&err);
            (sensor, outcome, Some(err.to_string()))
        }
    };

    let event = PollEvent {
        timestamp: Utc::now(),
        address: address.to_string(),
        outcome,
        detail,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    (sensor, event)
}

/// Build a connected Sensor from the primary payload, then try the optional
/// secondary endpoints. Either secondary call may fail without invalidating
/// the primary result.
async fn enrich(
    client: &DeviceClient,
    address: &str,
    raw: RawDeviceReading,
    window: usize,
) -> Sensor {
    let info_missing = raw.device_info.is_none();
    let (detail, report) = tokio::join!(client.fetch_detail(address), async {
        if info_missing {
            Some(client.fetch_info(address).await)
        } else {
            None
        }
    });

    let raw_value = match detail {
        Ok(detail) => detail.raw_reading,
        Err(err) => {
            debug!(address, error = %err, "detail reading unavailable");
            None
        }
    };

    let device_info = match report {
        Some(Ok(report)) => Some(report.network_info()),
        Some(Err(err)) => {
            debug!(address, error = %err, "device report unavailable");
            None
        }
        None => raw.device_info,
    };

    let location = match (raw.location_lat, raw.location_lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
        _ => None,
    };

    let reading = Reading {
        value: raw.latest_reading.value,
        unit: raw.latest_reading.unit.clone(),
        timestamp: raw.latest_reading.timestamp.unwrap_or_else(Utc::now),
        raw: raw_value,
    };

    let historical_data = history::synthesize(
        &mut rand::thread_rng(),
        reading.value,
        &reading.unit,
        raw.metric_type,
        window,
    );

    Sensor {
        id: raw.id,
        name: raw.name,
        address: address.to_string(),
        metric_type: Some(raw.metric_type),
        location,
        status: raw.status,
        connection_status: ConnectionStatus::Connected,
        latest_reading: Some(reading),
        historical_data,
        history_source: HistorySource::Synthesized,
        device_info,
        last_updated: Utc::now(),
    }
}
