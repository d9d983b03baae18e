// # nmupdate-core
//
// Core library keeping the DNS search domains of network devices in sync
// with a declarative config file.
//
// ## Architecture Overview
//
// - **SearchConfig**: desired state decoded from the config file
// - **ConfigWatcher**: turns filesystem notifications into reloaded configs
// - **DeviceScanner**: polls the device directory and emits snapshots when
//   the set of interface names changes
// - **Dispatcher**: merges both streams and applies the freshest
//   (config, snapshot) pair to matching devices
// - **Engine**: wires the three tasks to one cancellation token
//
// ## Collaborators
//
// The device directory, the device mutator and the filesystem watch
// primitive are traits (see [`traits`]) so backends can be swapped and
// tests can drive the engine deterministically.

pub mod config;
pub mod device;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod scanner;
pub mod traits;
pub mod watcher;

// Re-export core types for convenience
pub use config::{ApplyMode, EngineConfig, SearchConfig};
pub use device::{Device, DeviceSnapshot};
pub use dispatcher::{ApplyReport, DispatchEvent, Dispatcher, apply};
pub use engine::{Engine, EngineHandle};
pub use error::{Error, Result};
pub use scanner::DeviceScanner;
pub use traits::{DeviceDirectory, DeviceMutator, DirectoryDevice, FileEvent, PathWatcher};
pub use watcher::{ConfigWatcher, NotifyPathWatcher};
