//! Error types for nmupdate
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for nmupdate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for nmupdate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem and process I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML encoding/decoding errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Filesystem watch errors
    #[error("Watch error: {0}")]
    Watch(String),

    /// Device directory errors
    #[error("Device directory error: {0}")]
    Directory(String),

    /// A device modification failed
    #[error("Failed to modify device {device}: {message}")]
    Mutator {
        /// Interface name
        device: String,
        /// Error message or captured command output
        message: String,
    },

    /// Task did not shut down cleanly
    #[error("Shutdown error: {0}")]
    Shutdown(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a watch error
    pub fn watch(msg: impl Into<String>) -> Self {
        Self::Watch(msg.into())
    }

    /// Create a device directory error
    pub fn directory(msg: impl Into<String>) -> Self {
        Self::Directory(msg.into())
    }

    /// Create a device mutation error
    pub fn mutator(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mutator {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a shutdown error
    pub fn shutdown(msg: impl Into<String>) -> Self {
        Self::Shutdown(msg.into())
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
