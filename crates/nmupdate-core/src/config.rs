//! Configuration types for nmupdate
//!
//! [`SearchConfig`] is the desired state read from the watched YAML file.
//! [`EngineConfig`] holds runtime tuning for the engine's tasks.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Desired DNS search configuration
///
/// `prefix` and `tunnels` select devices, `whitelist` is the ordered list of
/// search domains applied to every selected device. The all-empty value is
/// the "unset" sentinel and never causes a device to be modified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Interface name prefix (e.g. "tun-")
    #[serde(rename = "tunnelPrefix")]
    pub prefix: String,

    /// Exact interface names
    pub tunnels: Vec<String>,

    /// Search domains to apply
    pub whitelist: Vec<String>,
}

impl SearchConfig {
    /// Create a configuration selecting devices by name prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Set the explicit interface names
    pub fn with_tunnels<I, S>(mut self, tunnels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tunnels = tunnels.into_iter().map(Into::into).collect();
        self
    }

    /// Set the search domains to apply
    pub fn with_whitelist<I, S>(mut self, whitelist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = whitelist.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this is the all-empty sentinel
    pub fn is_unset(&self) -> bool {
        self.prefix.is_empty() && self.tunnels.is_empty() && self.whitelist.is_empty()
    }

    /// Whether a device with this interface name is selected
    ///
    /// The prefix is checked first, the explicit list is the fallback.
    /// Either one matching is enough.
    pub fn matches(&self, name: &str) -> bool {
        if !self.prefix.is_empty() && name.starts_with(&self.prefix) {
            return true;
        }
        !self.tunnels.is_empty() && self.tunnels.iter().any(|t| t == name)
    }

    /// Parse a configuration from YAML text
    ///
    /// Empty documents decode to the sentinel.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed: Option<Self> = serde_yaml::from_str(text)?;
        Ok(parsed.unwrap_or_default())
    }

    /// Serialize to YAML using the on-disk field names
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Read and decode the config file, surfacing the failure cause
pub async fn try_load(path: &Path) -> Result<SearchConfig> {
    let text = tokio::fs::read_to_string(path).await?;
    SearchConfig::from_yaml(&text)
}

/// Read and decode the config file
///
/// Read or decode failures yield the sentinel configuration, which callers
/// treat as "nothing to do".
pub async fn load(path: &Path) -> SearchConfig {
    match try_load(path).await {
        Ok(config) => {
            debug!(path = %path.display(), ?config, "loaded config");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), "failed to load config, using empty config: {}", e);
            SearchConfig::default()
        }
    }
}

/// How the dispatcher runs device updates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMode {
    /// Every trigger spawns its own apply task; overlapping applies are allowed
    #[default]
    Concurrent,
    /// One worker applies the most recent state, superseded states are dropped
    Latest,
}

impl std::str::FromStr for ApplyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "concurrent" => Ok(Self::Concurrent),
            "latest" => Ok(Self::Latest),
            other => Err(Error::config(format!(
                "unknown apply mode '{}', expected 'concurrent' or 'latest'",
                other
            ))),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay between device directory polls (in milliseconds)
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// Delay between checks for a removed config file (in milliseconds)
    #[serde(default = "default_recovery_poll_interval_ms")]
    pub recovery_poll_interval_ms: u64,

    /// Checks before the config file is rewritten from the last known config
    #[serde(default = "default_recovery_max_attempts")]
    pub recovery_max_attempts: u32,

    /// Capacity of the config and device channels feeding the dispatcher
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Capacity of the dispatcher's monitoring event channel
    ///
    /// When full, events are dropped with a warning.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// How device updates are scheduled
    #[serde(default)]
    pub apply_mode: ApplyMode,

    /// Upper bound on waiting for tasks to stop (in seconds)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_ms == 0 {
            return Err(Error::config("scan interval must be > 0"));
        }
        if self.recovery_poll_interval_ms == 0 {
            return Err(Error::config("recovery poll interval must be > 0"));
        }
        if self.recovery_max_attempts == 0 {
            return Err(Error::config("recovery attempts must be > 0"));
        }
        if self.channel_capacity == 0 {
            return Err(Error::config("channel capacity must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("event channel capacity must be > 0"));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn recovery_poll_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval_ms(),
            recovery_poll_interval_ms: default_recovery_poll_interval_ms(),
            recovery_max_attempts: default_recovery_max_attempts(),
            channel_capacity: default_channel_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
            apply_mode: ApplyMode::default(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_scan_interval_ms() -> u64 {
    1000
}

fn default_recovery_poll_interval_ms() -> u64 {
    1
}

fn default_recovery_max_attempts() -> u32 {
    100
}

fn default_channel_capacity() -> usize {
    1
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}
