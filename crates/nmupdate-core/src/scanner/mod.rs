//! Device scanner
//!
//! Polls the [`DeviceDirectory`] at a fixed interval and emits a
//! [`DeviceSnapshot`] whenever the set of interface names differs from the
//! last emitted one. The first poll is always emitted so the dispatcher can
//! tell "no snapshot yet" from "no devices".
//!
//! Only names are compared. A device whose search domains change while its
//! name stays put does not produce a new snapshot.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::{Device, DeviceSnapshot, same_names};
use crate::traits::DeviceDirectory;

/// Periodic device directory poller
pub struct DeviceScanner {
    directory: Arc<dyn DeviceDirectory>,
    interval: Duration,
}

impl DeviceScanner {
    pub fn new(directory: Arc<dyn DeviceDirectory>, interval: Duration) -> Self {
        Self {
            directory,
            interval,
        }
    }

    /// Take one snapshot of the directory
    ///
    /// A listing failure degrades to an empty snapshot. Devices whose name
    /// cannot be resolved are left out.
    pub async fn snapshot(&self) -> DeviceSnapshot {
        let entries = match self.directory.devices().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    directory = self.directory.directory_name(),
                    "failed to list devices: {}", e
                );
                return DeviceSnapshot::default();
            }
        };

        let mut devices = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = match entry.interface().await {
                Ok(name) => name,
                Err(e) => {
                    debug!("skipping device without interface name: {}", e);
                    continue;
                }
            };

            let whitelist = match entry.ip4_searches().await {
                Ok(searches) => searches.unwrap_or_default(),
                Err(e) => {
                    debug!(device = %name, "no IPv4 search domains: {}", e);
                    Vec::new()
                }
            };

            devices.push(Device { name, whitelist });
        }

        DeviceSnapshot::new(devices)
    }

    /// Spawn the poll loop on the runtime
    pub fn spawn(
        self,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<DeviceSnapshot>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(self.run(tx, cancel));
        (rx, handle)
    }

    /// Poll until cancelled
    ///
    /// The name set of the last emitted snapshot is owned by this loop.
    pub async fn run(self, tx: mpsc::Sender<DeviceSnapshot>, cancel: CancellationToken) {
        info!(
            directory = self.directory.directory_name(),
            interval_ms = self.interval.as_millis() as u64,
            "starting device scanner"
        );

        let mut previous: Option<Vec<String>> = None;

        loop {
            let snapshot = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                snapshot = self.snapshot() => snapshot,
            };

            let names = snapshot.names();
            let changed = previous
                .as_ref()
                .is_none_or(|prev| !same_names(&names, prev));

            if changed {
                info!(devices = ?names, "device set changed");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    sent = tx.send(snapshot) => {
                        if sent.is_err() {
                            debug!("snapshot receiver dropped");
                            break;
                        }
                    }
                }
                previous = Some(names);
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("device scanner stopped");
    }
}
