//! nmupdate engine
//!
//! Wires the config watcher, the device scanner and the dispatcher together.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   SearchConfig    ┌──────────────┐   set_dns_search   ┌──────────────┐
//! │ ConfigWatcher │──────────────────►│              │───────────────────►│ DeviceMutator│
//! └───────────────┘                   │  Dispatcher  │                    └──────────────┘
//! ┌───────────────┐  DeviceSnapshot   │              │
//! │ DeviceScanner │──────────────────►│              │
//! └───────────────┘                   └──────────────┘
//!         ▲                                  │
//!         └──── CancellationToken ───────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. Create with [`Engine::new()`]
//! 2. Optionally [`Engine::subscribe()`] to dispatcher events
//! 3. Start with [`Engine::start()`] or [`Engine::start_with_watcher()`]
//! 4. Stop with [`EngineHandle::shutdown()`], which waits for every task

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{EngineConfig, SearchConfig};
use crate::dispatcher::{DispatchEvent, Dispatcher};
use crate::error::{Error, Result};
use crate::scanner::DeviceScanner;
use crate::traits::{DeviceDirectory, DeviceMutator, FileEvent, PathWatcher};
use crate::watcher::ConfigWatcher;

/// Core nmupdate engine
pub struct Engine {
    config_path: PathBuf,
    initial: SearchConfig,
    directory: Arc<dyn DeviceDirectory>,
    engine: EngineConfig,
    dispatcher: Dispatcher,
}

impl Engine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `config_path`: Config file to watch
    /// - `initial`: Config loaded at startup
    /// - `directory`: Device directory implementation
    /// - `mutator`: Device mutator implementation
    /// - `engine`: Runtime tuning
    pub fn new(
        config_path: impl Into<PathBuf>,
        initial: SearchConfig,
        directory: Arc<dyn DeviceDirectory>,
        mutator: Arc<dyn DeviceMutator>,
        engine: EngineConfig,
    ) -> Result<Self> {
        engine.validate()?;

        let dispatcher = Dispatcher::new(mutator, initial.clone(), engine.apply_mode);

        Ok(Self {
            config_path: config_path.into(),
            initial,
            directory,
            engine,
            dispatcher,
        })
    }

    /// Receive dispatcher events
    pub fn subscribe(&mut self) -> ReceiverStream<DispatchEvent> {
        ReceiverStream::new(self.dispatcher.subscribe(self.engine.event_channel_capacity))
    }

    /// Start all tasks, watching the config file with `notify`
    ///
    /// # Errors
    ///
    /// Fails if the config file cannot be watched.
    pub fn start(self) -> Result<EngineHandle> {
        let watcher = ConfigWatcher::new(&self.config_path, self.initial.clone(), &self.engine)?;
        Ok(self.launch(watcher))
    }

    /// Start all tasks with a custom watch backend
    pub fn start_with_watcher<W: PathWatcher + 'static>(
        self,
        watcher: W,
        events: mpsc::UnboundedReceiver<FileEvent>,
    ) -> Result<EngineHandle> {
        let watcher = ConfigWatcher::with_watcher(
            &self.config_path,
            watcher,
            events,
            self.initial.clone(),
            &self.engine,
        )?;
        Ok(self.launch(watcher))
    }

    fn launch<W: PathWatcher + 'static>(self, watcher: ConfigWatcher<W>) -> EngineHandle {
        let cancel = CancellationToken::new();
        let capacity = self.engine.channel_capacity;

        info!(
            config = %self.config_path.display(),
            directory = self.directory.directory_name(),
            "starting engine"
        );

        let (configs, watcher_handle) = watcher.spawn(capacity, cancel.child_token());
        let scanner = DeviceScanner::new(self.directory, self.engine.scan_interval());
        let (snapshots, scanner_handle) = scanner.spawn(capacity, cancel.child_token());
        let dispatcher_handle = self
            .dispatcher
            .spawn(configs, snapshots, cancel.child_token());

        EngineHandle {
            cancel,
            tasks: vec![
                ("config watcher", watcher_handle),
                ("device scanner", scanner_handle),
                ("dispatcher", dispatcher_handle),
            ],
        }
    }
}

/// Handle to a running engine
pub struct EngineHandle {
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl EngineHandle {
    /// Token that stops the engine when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every task and wait until all of them have exited
    ///
    /// # Errors
    ///
    /// Returns an error naming the tasks that panicked.
    pub async fn shutdown(self) -> Result<()> {
        info!("shutting down engine");
        self.cancel.cancel();

        let mut failed = Vec::new();
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                error!("{} task failed: {}", name, e);
                failed.push(name);
            }
        }

        if failed.is_empty() {
            info!("engine stopped");
            Ok(())
        } else {
            Err(Error::shutdown(format!("tasks failed: {}", failed.join(", "))))
        }
    }
}
