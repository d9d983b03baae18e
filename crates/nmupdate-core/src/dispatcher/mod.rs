//! Update dispatcher
//!
//! The single place where configuration and device state meet. The
//! dispatcher keeps the latest value of each stream and re-applies the
//! pair whenever either side changes.
//!
//! ## Apply scheduling
//!
//! - [`ApplyMode::Concurrent`]: every trigger spawns its own apply task.
//!   Applies may overlap and superseded ones are not cancelled; since an
//!   apply is idempotent the last one to finish wins.
//! - [`ApplyMode::Latest`]: triggers overwrite a single-slot cell read by one
//!   worker, so only the most recent state is applied once the worker is free.
//!
//! Either way, shutdown waits for applies already started.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ApplyMode, SearchConfig};
use crate::device::DeviceSnapshot;
use crate::traits::DeviceMutator;

/// Events emitted by the dispatcher for monitoring and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// A reloaded config was received
    ConfigReceived { config: SearchConfig },

    /// A new device snapshot was received
    DevicesReceived { count: usize },

    /// An apply ran without touching any device
    ApplySkipped { reason: SkipReason },

    /// A device's search domains were set
    DeviceUpdated { device: String, output: String },

    /// Setting a device's search domains failed
    DeviceUpdateFailed { device: String, error: String },

    /// The dispatcher stopped
    Stopped,
}

/// Why an apply did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The config is the all-empty sentinel
    UnsetConfig,
    /// No device snapshot has been received yet
    NoSnapshot,
}

/// Devices touched by one apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Matching devices whose update succeeded
    pub updated: Vec<String>,
    /// Matching devices whose update failed
    pub failed: Vec<String>,
}

impl ApplyReport {
    /// Every matching device, in snapshot order within each group
    pub fn matched(&self) -> impl Iterator<Item = &String> {
        self.updated.iter().chain(self.failed.iter())
    }
}

/// Non-blocking event sender
///
/// Events are dropped (with a warning) when the channel is full.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<DispatchEvent>>,
}

impl EventSink {
    fn emit(&self, event: DispatchEvent) {
        let Some(tx) = &self.tx else { return };
        if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event) {
            warn!("Dispatch event channel full, dropping event");
        }
    }
}

/// Apply `config` to every matching device in `devices`
///
/// Does nothing when `config` is the sentinel or no snapshot has been
/// received (`None`). An empty snapshot is processed normally. A failing
/// device is logged and does not stop the others.
pub async fn apply(
    config: &SearchConfig,
    devices: Option<&DeviceSnapshot>,
    mutator: &dyn DeviceMutator,
) -> ApplyReport {
    apply_with_events(config, devices, mutator, &EventSink::default()).await
}

async fn apply_with_events(
    config: &SearchConfig,
    devices: Option<&DeviceSnapshot>,
    mutator: &dyn DeviceMutator,
    events: &EventSink,
) -> ApplyReport {
    let mut report = ApplyReport::default();

    if config.is_unset() {
        debug!("config is empty, nothing to apply");
        events.emit(DispatchEvent::ApplySkipped {
            reason: SkipReason::UnsetConfig,
        });
        return report;
    }

    let Some(devices) = devices else {
        debug!("no device snapshot yet, nothing to apply");
        events.emit(DispatchEvent::ApplySkipped {
            reason: SkipReason::NoSnapshot,
        });
        return report;
    };

    for device in devices {
        if !config.matches(&device.name) {
            continue;
        }

        debug!(
            device = %device.name,
            current = ?device.whitelist,
            desired = ?config.whitelist,
            "setting DNS search domains"
        );

        match mutator.set_dns_search(&device.name, &config.whitelist).await {
            Ok(result) => {
                info!(
                    device = %device.name,
                    mutator = mutator.mutator_name(),
                    "{}", result.output
                );
                report.updated.push(device.name.clone());
                events.emit(DispatchEvent::DeviceUpdated {
                    device: device.name.clone(),
                    output: result.output,
                });
            }
            Err(e) => {
                error!(device = %device.name, "failed to set DNS search domains: {}", e);
                report.failed.push(device.name.clone());
                events.emit(DispatchEvent::DeviceUpdateFailed {
                    device: device.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    report
}

type ApplyRequest = (SearchConfig, Option<DeviceSnapshot>);

/// Runs applies according to the configured [`ApplyMode`]
enum Scheduler {
    Concurrent {
        tasks: JoinSet<ApplyReport>,
        mutator: Arc<dyn DeviceMutator>,
        events: EventSink,
    },
    Latest {
        cell: watch::Sender<Option<ApplyRequest>>,
        worker: JoinHandle<()>,
    },
}

impl Scheduler {
    fn new(mode: ApplyMode, mutator: Arc<dyn DeviceMutator>, events: EventSink) -> Self {
        match mode {
            ApplyMode::Concurrent => Self::Concurrent {
                tasks: JoinSet::new(),
                mutator,
                events,
            },
            ApplyMode::Latest => {
                let (cell, rx) = watch::channel(None);
                let worker = tokio::spawn(latest_worker(rx, mutator, events));
                Self::Latest { cell, worker }
            }
        }
    }

    fn trigger(&mut self, config: &SearchConfig, devices: Option<&DeviceSnapshot>) {
        match self {
            Self::Concurrent {
                tasks,
                mutator,
                events,
            } => {
                while let Some(finished) = tasks.try_join_next() {
                    log_join(finished);
                }

                let config = config.clone();
                let devices = devices.cloned();
                let mutator = Arc::clone(mutator);
                let events = events.clone();
                tasks.spawn(async move {
                    apply_with_events(&config, devices.as_ref(), mutator.as_ref(), &events).await
                });
            }
            Self::Latest { cell, .. } => {
                cell.send_replace(Some((config.clone(), devices.cloned())));
            }
        }
    }

    /// Wait for every apply already started
    async fn finish(self) {
        match self {
            Self::Concurrent { mut tasks, .. } => {
                while let Some(finished) = tasks.join_next().await {
                    log_join(finished);
                }
            }
            Self::Latest { cell, worker } => {
                drop(cell);
                if let Err(e) = worker.await {
                    error!("apply worker panicked: {}", e);
                }
            }
        }
    }
}

fn log_join(result: std::result::Result<ApplyReport, tokio::task::JoinError>) {
    match result {
        Ok(report) => debug!(
            updated = report.updated.len(),
            failed = report.failed.len(),
            "apply finished"
        ),
        Err(e) => error!("apply task panicked: {}", e),
    }
}

async fn latest_worker(
    mut rx: watch::Receiver<Option<ApplyRequest>>,
    mutator: Arc<dyn DeviceMutator>,
    events: EventSink,
) {
    // Keeps draining after the sender is dropped until the last value is seen
    while rx.changed().await.is_ok() {
        let request = rx.borrow_and_update().clone();
        if let Some((config, devices)) = request {
            let report =
                apply_with_events(&config, devices.as_ref(), mutator.as_ref(), &events).await;
            log_join(Ok(report));
        }
    }
}

/// Merges config reloads and device snapshots and applies the result
pub struct Dispatcher {
    mutator: Arc<dyn DeviceMutator>,
    config: SearchConfig,
    devices: Option<DeviceSnapshot>,
    mode: ApplyMode,
    events: EventSink,
}

impl Dispatcher {
    /// Create a dispatcher starting from the config loaded at startup
    pub fn new(mutator: Arc<dyn DeviceMutator>, initial: SearchConfig, mode: ApplyMode) -> Self {
        Self {
            mutator,
            config: initial,
            devices: None,
            mode,
            events: EventSink::default(),
        }
    }

    /// Enable monitoring events on a channel of `capacity`
    pub fn subscribe(&mut self, capacity: usize) -> mpsc::Receiver<DispatchEvent> {
        let (tx, rx) = mpsc::channel(capacity);
        self.events = EventSink { tx: Some(tx) };
        rx
    }

    /// Spawn the event loop on the runtime
    pub fn spawn(
        self,
        configs: mpsc::Receiver<SearchConfig>,
        snapshots: mpsc::Receiver<DeviceSnapshot>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(configs, snapshots, cancel))
    }

    /// Run the event loop until cancelled
    ///
    /// Each iteration waits for exactly one of: a config, a snapshot, or
    /// cancellation. A closed input stream is ignored from then on.
    pub async fn run(
        mut self,
        mut configs: mpsc::Receiver<SearchConfig>,
        mut snapshots: mpsc::Receiver<DeviceSnapshot>,
        cancel: CancellationToken,
    ) {
        info!(mode = ?self.mode, "starting dispatcher");

        let mut scheduler = Scheduler::new(self.mode, Arc::clone(&self.mutator), self.events.clone());
        let mut configs_open = true;
        let mut snapshots_open = true;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                config = configs.recv(), if configs_open => match config {
                    Some(config) => {
                        debug!(?config, "config update received");
                        self.events.emit(DispatchEvent::ConfigReceived { config: config.clone() });
                        self.config = config;
                        scheduler.trigger(&self.config, self.devices.as_ref());
                    }
                    None => {
                        debug!("config stream closed");
                        configs_open = false;
                    }
                },
                snapshot = snapshots.recv(), if snapshots_open => match snapshot {
                    Some(snapshot) => {
                        debug!(devices = snapshot.len(), "device snapshot received");
                        self.events.emit(DispatchEvent::DevicesReceived { count: snapshot.len() });
                        self.devices = Some(snapshot);
                        scheduler.trigger(&self.config, self.devices.as_ref());
                    }
                    None => {
                        debug!("device stream closed");
                        snapshots_open = false;
                    }
                },
            }
        }

        scheduler.finish().await;
        self.events.emit(DispatchEvent::Stopped);
        info!("dispatcher stopped");
    }
}
