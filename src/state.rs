//! Application state management
//!
//! Central state container shared between the scheduler (writer) and the
//! HTTP API (reader): the latest Sensor set and AggregateSnapshot, the
//! active polling configuration, and a bounded log of recent poll attempts.
//!
//! A completed cycle replaces the Sensor set and snapshot in a single write,
//! so readers never observe data mixed from two cycles.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::PollConfig;
use crate::models::{AggregateSnapshot, FieldConditions, MetricType, Sensor};
use crate::poller::PollEvent;

/// Maximum number of poll-attempt events to keep, newest first.
const MAX_EVENTS: usize = 64;

/// Central application state
#[derive(Debug)]
pub struct AppState {
    /// Active polling configuration; mutate only via the scheduler handle.
    config: PollConfig,
    /// Latest cycle's Sensor records, keyed by device address.
    sensors: BTreeMap<String, Sensor>,
    /// Latest published fleet aggregate; `None` until the first cycle lands.
    snapshot: Option<AggregateSnapshot>,
    /// Rolling debug log of poll attempts, newest first.
    events: VecDeque<PollEvent>,
    /// Application start time
    start_time: DateTime<Utc>,
    /// Completed (published) poll cycles
    cycles_completed: u64,
    /// Completion time of the last published cycle
    last_cycle: Option<DateTime<Utc>>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: PollConfig) -> Self {
        info!(
            devices = config.addresses.len(),
            interval_ms = config.interval_ms,
            "Initializing application state"
        );
        Self {
            config,
            sensors: BTreeMap::new(),
            snapshot: None,
            events: VecDeque::with_capacity(MAX_EVENTS),
            start_time: Utc::now(),
            cycles_completed: 0,
            last_cycle: None,
        }
    }

    /// Publish one completed cycle: replace the Sensor set and snapshot
    /// atomically and fold the cycle's poll events into the rolling log.
    pub fn publish_cycle(
        &mut self,
        sensors: BTreeMap<String, Sensor>,
        snapshot: AggregateSnapshot,
        events: Vec<PollEvent>,
    ) {
        self.cycles_completed += 1;
        self.last_cycle = Some(Utc::now());

        debug!(
            cycle = self.cycles_completed,
            connected = snapshot.connected_count,
            total = snapshot.total_count,
            "Publishing poll cycle"
        );

        self.sensors = sensors;
        self.snapshot = Some(snapshot);
        for event in events {
            self.push_event(event);
        }
    }

    fn push_event(&mut self, event: PollEvent) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_back();
        }
        self.events.push_front(event);
    }

    /// Latest Sensor records, in address order.
    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.values()
    }

    /// Latest published aggregate, if any cycle has completed.
    pub fn snapshot(&self) -> Option<&AggregateSnapshot> {
        self.snapshot.as_ref()
    }

    /// Recent poll events, newest first.
    pub fn events(&self) -> impl Iterator<Item = &PollEvent> {
        self.events.iter()
    }

    /// Active polling configuration.
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Mutable polling configuration, for the scheduler handle only.
    pub(crate) fn config_mut(&mut self) -> &mut PollConfig {
        &mut self.config
    }

    /// Averaged field conditions for the crop-recommendation engine.
    pub fn field_conditions(&self) -> FieldConditions {
        let snapshot = self.snapshot.as_ref();
        FieldConditions {
            soil_moisture: snapshot.and_then(|s| s.average(MetricType::SoilMoisture)),
            rainfall_equivalent: snapshot.and_then(|s| s.average(MetricType::Humidity)),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.start_time).num_seconds().max(0) as u64
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    pub fn last_cycle(&self) -> Option<DateTime<Utc>> {
        self.last_cycle
    }
}
