//! Test doubles and common utilities for contract tests
//!
//! The doubles record every call so tests can assert on exactly what the
//! engine asked of its collaborators.

#![allow(dead_code)]

use nmupdate_core::traits::{
    DeviceDirectory, DeviceMutator, DirectoryDevice, FileEvent, MutationOutput, PathWatcher,
};
use nmupdate_core::{Error, Result, SearchConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// One device as the fake directory will report it
#[derive(Debug, Clone)]
pub struct FakeEntry {
    /// `None` makes `interface()` fail
    pub name: Option<String>,
    pub searches: Option<Vec<String>>,
}

impl FakeEntry {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            searches: None,
        }
    }

    pub fn unnamed() -> Self {
        Self {
            name: None,
            searches: None,
        }
    }

    pub fn with_searches(mut self, searches: &[&str]) -> Self {
        self.searches = Some(searches.iter().map(|s| s.to_string()).collect());
        self
    }
}

#[async_trait::async_trait]
impl DirectoryDevice for FakeEntry {
    async fn interface(&self) -> Result<String> {
        self.name
            .clone()
            .ok_or_else(|| Error::directory("interface name unavailable"))
    }

    async fn ip4_searches(&self) -> Result<Option<Vec<String>>> {
        Ok(self.searches.clone())
    }
}

/// A device directory whose listing the test controls
#[derive(Clone, Default)]
pub struct FakeDirectory {
    entries: Arc<Mutex<Vec<FakeEntry>>>,
    failing: Arc<AtomicBool>,
    list_call_count: Arc<AtomicUsize>,
}

impl FakeDirectory {
    pub fn with_names(names: &[&str]) -> Self {
        let directory = Self::default();
        directory.set_names(names);
        directory
    }

    pub fn set_entries(&self, entries: Vec<FakeEntry>) {
        *self.entries.lock().unwrap() = entries;
    }

    pub fn set_names(&self, names: &[&str]) {
        self.set_entries(names.iter().map(|n| FakeEntry::named(n)).collect());
    }

    /// Make `devices()` fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DeviceDirectory for FakeDirectory {
    async fn devices(&self) -> Result<Vec<Box<dyn DirectoryDevice>>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::directory("directory unavailable"));
        }
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .map(|e| Box::new(e) as Box<dyn DirectoryDevice>)
            .collect())
    }

    fn directory_name(&self) -> &'static str {
        "fake"
    }
}

/// A device mutator that records (device, comma-joined domains) pairs
#[derive(Clone, Default)]
pub struct RecordingMutator {
    calls: Arc<Mutex<Vec<(String, String)>>>,
    call_count: Arc<AtomicUsize>,
    completed_count: Arc<AtomicUsize>,
    failing_devices: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl RecordingMutator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make calls for `device` fail
    pub fn fail_on(&self, device: &str) {
        self.failing_devices.lock().unwrap().push(device.to_string());
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Calls that ran to completion (including the delay)
    pub fn completed_count(&self) -> usize {
        self.completed_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DeviceMutator for RecordingMutator {
    async fn set_dns_search(&self, device: &str, domains: &[String]) -> Result<MutationOutput> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push((device.to_string(), domains.join(",")));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed_count.fetch_add(1, Ordering::SeqCst);

        if self.failing_devices.lock().unwrap().iter().any(|d| d == device) {
            return Err(Error::mutator(device, "Error: Device not found."));
        }
        Ok(MutationOutput::new(format!(
            "Connection successfully reapplied to device '{device}'."
        )))
    }

    fn mutator_name(&self) -> &'static str {
        "recording"
    }
}

/// Watch/unwatch calls seen by [`FakePathWatcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCall {
    Watch(PathBuf),
    Unwatch(PathBuf),
}

/// A watch backend driven by the test through an event sender
#[derive(Clone, Default)]
pub struct FakePathWatcher {
    calls: Arc<Mutex<Vec<WatchCall>>>,
    fail_watch: Arc<AtomicBool>,
}

impl FakePathWatcher {
    /// Create the backend plus the sender the test uses to inject events
    pub fn new() -> (
        Self,
        mpsc::UnboundedSender<FileEvent>,
        mpsc::UnboundedReceiver<FileEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::default(), tx, rx)
    }

    pub fn failing() -> Self {
        let watcher = Self::default();
        watcher.fail_watch.store(true, Ordering::SeqCst);
        watcher
    }

    pub fn calls(&self) -> Vec<WatchCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl PathWatcher for FakePathWatcher {
    fn watch(&mut self, path: &Path) -> Result<()> {
        if self.fail_watch.load(Ordering::SeqCst) {
            return Err(Error::watch(format!("cannot watch {}", path.display())));
        }
        self.calls
            .lock()
            .unwrap()
            .push(WatchCall::Watch(path.to_path_buf()));
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(WatchCall::Unwatch(path.to_path_buf()));
        Ok(())
    }
}

/// Write `config` as YAML to `path`
pub fn write_config(path: &Path, config: &SearchConfig) {
    std::fs::write(path, config.to_yaml().unwrap()).unwrap();
}

/// The config used by most scenarios
pub fn corp_config() -> SearchConfig {
    SearchConfig::with_prefix("corp-").with_whitelist(["corp.example.com"])
}

/// Receive from `rx`, failing the test after `ms` milliseconds
pub async fn recv_within<T>(rx: &mut mpsc::Receiver<T>, ms: u64) -> Option<T> {
    tokio::time::timeout(Duration::from_millis(ms), rx.recv())
        .await
        .expect("timed out waiting for a value")
}

/// Assert nothing arrives on `rx` for `ms` milliseconds
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::Receiver<T>, ms: u64) {
    if let Ok(value) = tokio::time::timeout(Duration::from_millis(ms), rx.recv()).await {
        panic!("expected no value, got {:?}", value);
    }
}

/// Poll `condition` every 10ms until it holds or `ms` elapses
pub async fn wait_until(ms: u64, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(ms);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
