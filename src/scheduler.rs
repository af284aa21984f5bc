//! Poll scheduling
//!
//! Runs one poll-and-aggregate cycle immediately, then on a fixed interval,
//! and restarts the schedule whenever the device list or interval changes.
//!
//! All configuration changes route through the [`Scheduler`] handle so a
//! cycle always works from the address snapshot taken at its own start.
//! Reconfiguring while a cycle is in flight lets that cycle finish but
//! discards its result: each cycle carries the generation of the
//! configuration that started it, and only results from the current
//! generation are published. Publication happens in a single task, so
//! snapshots become visible in strict cycle order.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::aggregate;
use crate::config::PollConfig;
use crate::device::DeviceClient;
use crate::error::{AppError, AppResult};
use crate::models::{AggregateSnapshot, Sensor};
use crate::poller::{self, PollEvent};
use crate::state::AppState;
use crate::validation;

/// Control messages for the scheduler task.
#[derive(Debug)]
enum Command {
    Reconfigure(PollConfig),
    Refresh,
    Stop,
}

/// Result of one poll-and-aggregate cycle, tagged with the configuration
/// generation that started it.
struct CycleOutcome {
    generation: u64,
    sensors: BTreeMap<String, Sensor>,
    snapshot: AggregateSnapshot,
    events: Vec<PollEvent>,
}

/// Handle to the background scheduler task.
///
/// Cloneable; dropping every clone stops the task.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Command>,
    state: Arc<RwLock<AppState>>,
}

impl Scheduler {
    /// Start the scheduler with the configuration currently held in `state`.
    ///
    /// The first cycle runs immediately; subsequent cycles fire on the
    /// configured interval.
    pub async fn spawn(
        state: Arc<RwLock<AppState>>,
        client: DeviceClient,
        window: usize,
    ) -> Self {
        let config = state.read().await.config().clone();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(run(state.clone(), client, window, rx, config));

        Self { tx, state }
    }

    /// Add a device address and restart the poll schedule.
    ///
    /// Returns the normalized address. A rejected address leaves the active
    /// configuration untouched.
    pub async fn add_device(&self, address: &str) -> AppResult<String> {
        let address = validation::validate_device_address(address)?;

        let config = {
            let mut state = self.state.write().await;
            if state.config().addresses.iter().any(|a| a == &address) {
                return Err(AppError::ConfigError(format!(
                    "Device {address} is already configured"
                )));
            }
            state.config_mut().addresses.push(address.clone());
            state.config().clone()
        };

        self.send(Command::Reconfigure(config))?;
        Ok(address)
    }

    /// Remove a device address and restart the poll schedule.
    pub async fn remove_device(&self, address: &str) -> AppResult<()> {
        let address = address.trim();

        let config = {
            let mut state = self.state.write().await;
            let before = state.config().addresses.len();
            state.config_mut().addresses.retain(|a| a != address);
            if state.config().addresses.len() == before {
                return Err(AppError::NotFound(format!(
                    "Device {address} is not configured"
                )));
            }
            state.config().clone()
        };

        self.send(Command::Reconfigure(config))
    }

    /// Change the polling interval and restart the poll schedule.
    pub async fn set_interval(&self, interval_ms: u64) -> AppResult<()> {
        let interval_ms = validation::validate_poll_interval(interval_ms)?;

        let config = {
            let mut state = self.state.write().await;
            state.config_mut().interval_ms = interval_ms;
            state.config().clone()
        };

        self.send(Command::Reconfigure(config))
    }

    /// Trigger an immediate poll cycle without touching the schedule.
    pub fn refresh(&self) -> AppResult<()> {
        self.send(Command::Refresh)
    }

    /// Stop the scheduler. In-flight device calls run to their own timeout
    /// but their results are no longer published.
    pub fn stop(&self) -> AppResult<()> {
        self.send(Command::Stop)
    }

    fn send(&self, command: Command) -> AppResult<()> {
        self.tx
            .send(command)
            .map_err(|_| AppError::InternalError("Scheduler is not running".to_string()))
    }
}

/// Scheduler task body.
async fn run(
    state: Arc<RwLock<AppState>>,
    client: DeviceClient,
    window: usize,
    mut rx: mpsc::UnboundedReceiver<Command>,
    mut config: PollConfig,
) {
    let mut generation: u64 = 0;
    let mut cycles: JoinSet<CycleOutcome> = JoinSet::new();
    // Whether a cycle of the current generation is outstanding; used to
    // avoid stacking duplicate cycles when a tick fires early.
    let mut in_flight;

    info!(
        devices = config.addresses.len(),
        interval_ms = config.interval_ms,
        "Scheduler started"
    );

    spawn_cycle(&mut cycles, &client, &config, window, generation);
    in_flight = true;
    let mut ticker = new_ticker(&config);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if in_flight {
                    debug!("Previous cycle still in flight; skipping tick");
                } else {
                    spawn_cycle(&mut cycles, &client, &config, window, generation);
                    in_flight = true;
                }
            }

            Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                match joined {
                    Ok(outcome) if outcome.generation == generation => {
                        in_flight = false;
                        let mut state = state.write().await;
                        state.publish_cycle(outcome.sensors, outcome.snapshot, outcome.events);
                    }
                    Ok(outcome) => {
                        debug!(
                            generation = outcome.generation,
                            current = generation,
                            "Discarding cycle result from superseded configuration"
                        );
                    }
                    Err(err) => {
                        // A cycle failing for a non-device reason must not
                        // stop the loop; the previous snapshot stays
                        // published until the next successful cycle.
                        error!(error = %err, "Poll cycle failed; keeping previous snapshot");
                        in_flight = false;
                    }
                }
            }

            command = rx.recv() => {
                match command {
                    Some(Command::Reconfigure(new_config)) => {
                        generation += 1;
                        config = new_config;
                        info!(
                            generation,
                            devices = config.addresses.len(),
                            interval_ms = config.interval_ms,
                            "Configuration changed; restarting poll schedule"
                        );
                        ticker = new_ticker(&config);
                        spawn_cycle(&mut cycles, &client, &config, window, generation);
                        in_flight = true;
                    }
                    Some(Command::Refresh) => {
                        if in_flight {
                            debug!("Refresh requested while a cycle is in flight; ignoring");
                        } else {
                            spawn_cycle(&mut cycles, &client, &config, window, generation);
                            in_flight = true;
                        }
                    }
                    Some(Command::Stop) | None => break,
                }
            }
        }
    }

    info!("Scheduler stopped");
}

fn new_ticker(config: &PollConfig) -> tokio::time::Interval {
    // The first cycle has already been spawned, so the ticker starts one
    // full interval out.
    let mut ticker = interval_at(Instant::now() + config.interval(), config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn spawn_cycle(
    cycles: &mut JoinSet<CycleOutcome>,
    client: &DeviceClient,
    config: &PollConfig,
    window: usize,
    generation: u64,
) {
    let client = client.clone();
    let config = config.clone();

    cycles.spawn(async move {
        let started = Instant::now();
        if config.addresses.is_empty() {
            warn!("No devices configured; publishing empty snapshot");
        } else {
            info!(devices = config.addresses.len(), "Starting poll cycle");
        }

        let (sensors, events) = poller::poll_all(&client, &config.addresses, window).await;
        let snapshot = aggregate::aggregate(&sensors, window);

        info!(
            connected = snapshot.connected_count,
            total = snapshot.total_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Poll cycle complete"
        );

        CycleOutcome {
            generation,
            sensors,
            snapshot,
            events,
        }
    });
}
