//! Data models for devices, sensors, and fleet aggregates
//!
//! Defines the core data structures used throughout the application.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metric types reported by the field devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    SoilMoisture,
    Temperature,
    Humidity,
    AirQuality,
    PirMotion,
}

impl MetricType {
    /// Physically valid range for the metric, where one is defined.
    ///
    /// Percentage metrics are bounded; the analog and motion metrics have no
    /// agreed bound across device firmware revisions and are left open.
    pub fn valid_range(self) -> Option<RangeInclusive<f64>> {
        match self {
            MetricType::SoilMoisture | MetricType::Humidity => Some(0.0..=100.0),
            MetricType::Temperature | MetricType::AirQuality | MetricType::PirMotion => None,
        }
    }
}

/// Coarse reading status reported by a device alongside its value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTag {
    Normal,
    Low,
    High,
    Error,
    /// Anything a newer firmware reports that this build does not know.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Connection classification for one device after a poll attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Primary status call succeeded and parsed.
    Connected,
    /// The device could not be reached (timeout or connection failure).
    Disconnected,
    /// The device answered, but with an HTTP failure or malformed payload.
    Error,
}

/// Geographic position of a device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Network-level device metadata, as embedded in the status payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceNetworkInfo {
    pub ip: String,
    pub mac: String,
    /// WiFi signal strength in dBm.
    pub rssi: i32,
    /// Device uptime in milliseconds.
    pub uptime: u64,
}

/// Payload returned by a device's primary status endpoint (`GET /`).
///
/// Missing required fields fail deserialization and the reading is rejected
/// as malformed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDeviceReading {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    #[serde(default)]
    pub status: StatusTag,
    pub latest_reading: RawReading,
    #[serde(default)]
    pub device_info: Option<DeviceNetworkInfo>,
}

/// The current measurement inside a status payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RawReading {
    pub value: f64,
    pub unit: String,
    /// Device clocks are unreliable; absent timestamps fall back to the
    /// poll time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Detailed measurement from a device's `GET /sensor` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DetailReading {
    pub sensor_id: String,
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub status: StatusTag,
    /// Uncalibrated analog value, when the firmware exposes it.
    #[serde(default)]
    pub raw_reading: Option<f64>,
}

/// Full device report from a device's `GET /info` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceReport {
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    pub firmware_version: String,
    pub ip_address: String,
    pub mac_address: String,
    pub wifi_ssid: String,
    pub wifi_rssi: i32,
    pub uptime_ms: u64,
    pub free_heap: u64,
    pub chip_id: u64,
}

impl DeviceReport {
    /// Reduce the full report to the network metadata carried on a Sensor.
    pub fn network_info(&self) -> DeviceNetworkInfo {
        DeviceNetworkInfo {
            ip: self.ip_address.clone(),
            mac: self.mac_address.clone(),
            rssi: self.wifi_rssi,
            uptime: self.uptime_ms,
        }
    }
}

/// A validated measurement carried on a Sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    /// Uncalibrated analog value from the detail endpoint, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<f64>,
}

/// One point of a sensor's historical window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
}

/// Where a sensor's historical window came from.
///
/// The devices expose only their current state, so this implementation always
/// produces `Synthesized` windows. `Measured` exists so a real time-series
/// store can be swapped in without changing downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistorySource {
    Synthesized,
    Measured,
}

/// Per-device record for one poll cycle.
///
/// A Sensor exists for every configured address, reachable or not, so the
/// fleet view is never silently incomplete. Identity fields are copied from
/// the device payload when the device answered and are placeholders otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub id: String,
    pub name: String,
    /// The configured network address this record was polled from.
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<MetricType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    pub status: StatusTag,
    pub connection_status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_reading: Option<Reading>,
    /// Ordered oldest to newest; empty when the device was not connected.
    pub historical_data: Vec<HistoryPoint>,
    pub history_source: HistorySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceNetworkInfo>,
    pub last_updated: DateTime<Utc>,
}

impl Sensor {
    /// Placeholder record for a device that did not produce a usable reading.
    pub fn unavailable(address: &str, connection_status: ConnectionStatus) -> Self {
        let slug = address.replace(['.', ':'], "_");
        Self {
            id: format!("device_{slug}"),
            name: format!("Device ({address})"),
            address: address.to_string(),
            metric_type: None,
            location: None,
            status: StatusTag::Unknown,
            connection_status,
            latest_reading: None,
            historical_data: Vec::new(),
            history_source: HistorySource::Synthesized,
            device_info: None,
            last_updated: Utc::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_status == ConnectionStatus::Connected
    }
}

/// Risk band derived from the fleet soil-moisture average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoistureRisk {
    Critical,
    High,
    Medium,
    Low,
}

impl MoistureRisk {
    /// Band thresholds match the irrigation guidance shown on the dashboard.
    pub fn from_moisture(percent: f64) -> Self {
        if percent < 30.0 {
            MoistureRisk::Critical
        } else if percent < 50.0 {
            MoistureRisk::High
        } else if percent < 70.0 {
            MoistureRisk::Medium
        } else {
            MoistureRisk::Low
        }
    }
}

/// One time bucket of the fleet chart series.
///
/// Metrics with no connected representative sensor are simply absent from
/// `values`; absence is the "no data" marker, never a zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartPoint {
    pub time: String,
    pub values: BTreeMap<MetricType, f64>,
}

/// Fleet-wide aggregate published at the end of each poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub generated_at: DateTime<Utc>,
    /// Mean of the latest readings per metric type, connected sensors only.
    /// A metric with no connected sensors has no entry.
    pub averages: BTreeMap<MetricType, f64>,
    pub connected_count: usize,
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moisture_risk: Option<MoistureRisk>,
    pub chart: Vec<ChartPoint>,
}

impl AggregateSnapshot {
    /// Fleet average for one metric, `None` when no connected sensor of that
    /// type reported in this cycle.
    pub fn average(&self, metric: MetricType) -> Option<f64> {
        self.averages.get(&metric).copied()
    }
}

/// Min/avg/max over one sensor's historical window, for detail views.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// Read accessor consumed by the crop-recommendation engine.
///
/// `None` means "no data"; the recommendation layer must not treat it as
/// zero. Rainfall is not measured directly, so the fleet humidity average
/// stands in as the rainfall-equivalent signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FieldConditions {
    pub soil_moisture: Option<f64>,
    pub rainfall_equivalent: Option<f64>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub cycles_completed: u64,
    pub last_cycle: Option<DateTime<Utc>>,
}
