//! Config file watcher
//!
//! Turns filesystem notifications for the config file into a stream of
//! reloaded [`SearchConfig`] values.
//!
//! ## Editor replace patterns
//!
//! Editors such as vim rename or delete the original file and write a new
//! one in its place. The watch follows the old inode, so on
//! [`FileEvent::Remove`] the watcher polls for the path to reappear,
//! re-establishes the watch and reloads. If the path does not come back
//! within the configured number of checks, the last known config is written
//! back so the file is never left missing.
//!
//! ```text
//! Remove ──► path exists? ──yes──► unwatch + watch ──► reload ──► emit
//!               │ no
//!               ▼
//!          attempts left? ──no──► rewrite last known config ──┘
//!               │ yes
//!               └── sleep(recovery_poll_interval) ──► path exists?
//! ```

mod notify_backend;

pub use notify_backend::{NotifyPathWatcher, classify};

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{self, EngineConfig, SearchConfig};
use crate::error::Result;
use crate::traits::{FileEvent, PathWatcher};

/// Watches one config file and emits every meaningful reload
///
/// Reloads that decode to the value emitted last are not forwarded.
pub struct ConfigWatcher<W: PathWatcher> {
    path: PathBuf,
    watcher: W,
    events: mpsc::UnboundedReceiver<FileEvent>,

    /// Last config that decoded successfully and was not the sentinel
    last_known: SearchConfig,

    /// Last config handed to the consumer (initially the startup config)
    last_emitted: SearchConfig,

    recovery_poll_interval: Duration,
    recovery_max_attempts: u32,
}

impl ConfigWatcher<NotifyPathWatcher> {
    /// Create a watcher on `path` backed by `notify`
    ///
    /// # Errors
    ///
    /// Fails if the path cannot be watched. This is fatal at startup.
    pub fn new(
        path: impl Into<PathBuf>,
        initial: SearchConfig,
        engine: &EngineConfig,
    ) -> Result<Self> {
        let (watcher, events) = NotifyPathWatcher::new()?;
        Self::with_watcher(path, watcher, events, initial, engine)
    }
}

impl<W: PathWatcher + 'static> ConfigWatcher<W> {
    /// Create a watcher on `path` using a custom watch backend
    ///
    /// `initial` is the config loaded at startup; it seeds both the recovery
    /// fallback and the change filter.
    pub fn with_watcher(
        path: impl Into<PathBuf>,
        mut watcher: W,
        events: mpsc::UnboundedReceiver<FileEvent>,
        initial: SearchConfig,
        engine: &EngineConfig,
    ) -> Result<Self> {
        let path = path.into();
        watcher.watch(&path)?;

        Ok(Self {
            path,
            watcher,
            events,
            last_known: initial.clone(),
            last_emitted: initial,
            recovery_poll_interval: engine.recovery_poll_interval(),
            recovery_max_attempts: engine.recovery_max_attempts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Spawn the watch loop on the runtime
    ///
    /// Returns the receiving end of the config stream and the task handle.
    /// The stream ends once `cancel` fires.
    pub fn spawn(
        self,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<SearchConfig>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(self.run(tx, cancel));
        (rx, handle)
    }

    /// Run the watch loop until cancelled
    ///
    /// Dropping `tx` on return closes the stream for the consumer.
    pub async fn run(mut self, tx: mpsc::Sender<SearchConfig>, cancel: CancellationToken) {
        info!("starting config watcher for {}", self.path.display());

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => {
                        warn!("file watch backend closed its event channel");
                        break;
                    }
                },
            };

            debug!(?event, "config file event");

            let reloaded = match event {
                FileEvent::Remove => match self.recover(&cancel).await {
                    Some(config) => config,
                    None => break,
                },
                _ => self.reload().await,
            };

            if !self.emit(reloaded, &tx, &cancel).await {
                break;
            }
        }

        if let Err(e) = self.watcher.unwatch(&self.path) {
            debug!("unwatch on shutdown failed: {}", e);
        }
        info!("config watcher stopped");
    }

    /// Reload the file, tracking the last known good config
    async fn reload(&mut self) -> SearchConfig {
        match config::try_load(&self.path).await {
            Ok(config) => {
                if !config.is_unset() {
                    self.last_known = config.clone();
                }
                config
            }
            Err(e) => {
                warn!(path = %self.path.display(), "failed to reload config: {}", e);
                SearchConfig::default()
            }
        }
    }

    /// Wait for a removed file to come back, then re-watch and reload
    ///
    /// Returns `None` if cancelled while waiting.
    async fn recover(&mut self, cancel: &CancellationToken) -> Option<SearchConfig> {
        debug!("config file removed or replaced, waiting for it to reappear");

        let mut attempts = 0;
        loop {
            if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
                break;
            }

            if attempts == self.recovery_max_attempts {
                warn!(
                    "config file {} did not reappear after {} checks, restoring last known config",
                    self.path.display(),
                    attempts
                );
                if let Err(e) = restore(&self.path, &self.last_known).await {
                    error!("failed to restore config file: {}", e);
                }
                break;
            }

            attempts += 1;
            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(self.recovery_poll_interval) => {}
            }
        }

        // The old watch points at the removed inode
        if let Err(e) = self.watcher.unwatch(&self.path) {
            debug!("unwatch of replaced file failed: {}", e);
        }
        if let Err(e) = self.watcher.watch(&self.path) {
            error!("failed to re-watch {}: {}", self.path.display(), e);
        }

        Some(self.reload().await)
    }

    /// Forward a reloaded config unless it equals the last one sent
    ///
    /// Returns `false` when the loop should stop.
    async fn emit(
        &mut self,
        config: SearchConfig,
        tx: &mpsc::Sender<SearchConfig>,
        cancel: &CancellationToken,
    ) -> bool {
        if config == self.last_emitted {
            debug!("config unchanged, not forwarding");
            return true;
        }

        info!(
            prefix = %config.prefix,
            tunnels = config.tunnels.len(),
            whitelist = config.whitelist.len(),
            "config reloaded"
        );
        self.last_emitted = config.clone();

        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            sent = tx.send(config) => {
                if sent.is_err() {
                    debug!("config receiver dropped");
                }
                sent.is_ok()
            }
        }
    }
}

/// Write `config` to `path`
async fn restore(path: &Path, config: &SearchConfig) -> Result<()> {
    let yaml = config.to_yaml()?;
    tokio::fs::write(path, yaml).await?;
    info!("restored {} from last known config", path.display());
    Ok(())
}
