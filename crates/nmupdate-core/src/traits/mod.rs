//! Collaborator traits for nmupdate
//!
//! - [`DeviceDirectory`]: enumerate network devices and their properties
//! - [`DeviceMutator`]: set a device's DNS search domains
//! - [`PathWatcher`]: watch one filesystem path for changes

pub mod device_directory;
pub mod device_mutator;
pub mod path_watcher;

pub use device_directory::{DeviceDirectory, DirectoryDevice};
pub use device_mutator::{DeviceMutator, MutationOutput};
pub use path_watcher::{FileEvent, PathWatcher};
