//! Contract Test: Config Watching & Replace Recovery
//!
//! This test verifies how filesystem events turn into config reloads.
//!
//! Constraints verified:
//! - Content changes reload and emit the new config
//! - Reloads equal to the last emitted config are not forwarded
//! - A removed file that reappears is re-watched and emitted exactly once
//! - A file that never reappears is restored from the last known config
//! - Decode failures emit the empty config
//! - Cancellation unwatches and closes the stream
//! - An unwatchable path fails at construction

mod common;

use common::*;
use nmupdate_core::traits::FileEvent;
use nmupdate_core::{ConfigWatcher, EngineConfig, SearchConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Harness {
    _dir: tempfile::TempDir,
    path: PathBuf,
    backend: FakePathWatcher,
    events: mpsc::UnboundedSender<FileEvent>,
    configs: mpsc::Receiver<SearchConfig>,
    handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

fn engine_config() -> EngineConfig {
    EngineConfig {
        recovery_poll_interval_ms: 1,
        recovery_max_attempts: 20,
        ..EngineConfig::default()
    }
}

fn start(initial: SearchConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write_config(&path, &initial);

    let (backend, events, rx) = FakePathWatcher::new();
    let watcher =
        ConfigWatcher::with_watcher(&path, backend.clone(), rx, initial, &engine_config())
            .expect("watch succeeds");

    let cancel = CancellationToken::new();
    let (configs, handle) = watcher.spawn(1, cancel.clone());

    Harness {
        _dir: dir,
        path,
        backend,
        events,
        configs,
        handle,
        cancel,
    }
}

impl Harness {
    async fn stop(self) -> (FakePathWatcher, mpsc::Receiver<SearchConfig>) {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("watcher should stop promptly")
            .unwrap();
        (self.backend, self.configs)
    }
}

#[tokio::test]
async fn content_change_emits_new_config() {
    let mut h = start(corp_config());

    let updated = corp_config().with_whitelist(["corp.example.com", "example.org"]);
    write_config(&h.path, &updated);
    h.events.send(FileEvent::CloseWrite).unwrap();

    assert_eq!(recv_within(&mut h.configs, 1000).await, Some(updated));
    h.stop().await;
}

#[tokio::test]
async fn unchanged_reload_is_not_forwarded() {
    let mut h = start(corp_config());

    // Modify + close-after-write for a single save of identical content
    h.events.send(FileEvent::Modify).unwrap();
    h.events.send(FileEvent::CloseWrite).unwrap();
    assert_quiet(&mut h.configs, 100).await;

    let updated = SearchConfig::with_prefix("tun-").with_whitelist(["office.example"]);
    write_config(&h.path, &updated);
    h.events.send(FileEvent::Modify).unwrap();
    h.events.send(FileEvent::CloseWrite).unwrap();

    assert_eq!(recv_within(&mut h.configs, 1000).await, Some(updated));
    assert_quiet(&mut h.configs, 100).await;
    h.stop().await;
}

#[tokio::test]
async fn replaced_file_is_rewatched_and_emitted_once() {
    let mut h = start(corp_config());

    // Editor pattern: the new file is already in place when the watcher
    // sees the removal of the old one
    let replaced = SearchConfig::with_prefix("tun-").with_whitelist(["office.example"]);
    let staging = h.path.with_extension("yaml.tmp");
    write_config(&staging, &replaced);
    std::fs::remove_file(&h.path).unwrap();
    std::fs::rename(&staging, &h.path).unwrap();
    h.events.send(FileEvent::Remove).unwrap();

    assert_eq!(recv_within(&mut h.configs, 1000).await, Some(replaced));
    assert_quiet(&mut h.configs, 100).await;

    let path = h.path.clone();
    let (backend, _) = h.stop().await;
    assert_eq!(
        backend.calls(),
        vec![
            WatchCall::Watch(path.clone()),
            WatchCall::Unwatch(path.clone()),
            WatchCall::Watch(path.clone()),
            WatchCall::Unwatch(path),
        ]
    );
}

#[tokio::test]
async fn missing_file_is_restored_from_last_known_config() {
    let mut h = start(corp_config());

    let updated = corp_config().with_whitelist(["corp.example.com", "example.org"]);
    write_config(&h.path, &updated);
    h.events.send(FileEvent::Write).unwrap();
    assert_eq!(recv_within(&mut h.configs, 1000).await, Some(updated.clone()));

    std::fs::remove_file(&h.path).unwrap();
    h.events.send(FileEvent::Remove).unwrap();

    let path = h.path.clone();
    let restored = wait_until(2000, || {
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| SearchConfig::from_yaml(&text).ok())
            .is_some_and(|config| config == updated)
    })
    .await;
    assert!(restored, "config file should be restored with the last known config");

    // Restored content equals what was already emitted
    assert_quiet(&mut h.configs, 100).await;
    h.stop().await;
}

#[tokio::test]
async fn undecodable_file_emits_empty_config() {
    let mut h = start(corp_config());

    std::fs::write(&h.path, "tunnels: {not: [a list").unwrap();
    h.events.send(FileEvent::CloseWrite).unwrap();

    let reloaded = recv_within(&mut h.configs, 1000).await.expect("config");
    assert!(reloaded.is_unset());
    h.stop().await;
}

#[tokio::test]
async fn cancellation_unwatches_and_closes_stream() {
    let h = start(corp_config());
    let path = h.path.clone();

    let (backend, mut configs) = h.stop().await;

    assert_eq!(backend.calls().last(), Some(&WatchCall::Unwatch(path)));
    assert!(configs.recv().await.is_none(), "stream should be closed");
}

#[tokio::test]
async fn unwatchable_path_fails_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write_config(&path, &corp_config());

    let (_tx, rx) = mpsc::unbounded_channel();
    let result = ConfigWatcher::with_watcher(
        &path,
        FakePathWatcher::failing(),
        rx,
        corp_config(),
        &engine_config(),
    );

    assert!(result.is_err());
}

#[tokio::test]
async fn notify_backend_reports_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write_config(&path, &corp_config());

    let watcher = ConfigWatcher::new(&path, corp_config(), &engine_config())
        .expect("notify can watch a temp file");
    let cancel = CancellationToken::new();
    let (mut configs, handle) = watcher.spawn(1, cancel.clone());

    // Give the backend a moment to register the watch
    tokio::time::sleep(Duration::from_millis(100)).await;

    let updated = SearchConfig::with_prefix("tun-").with_whitelist(["office.example"]);
    write_config(&path, &updated);

    // A truncate may surface as an intermediate empty config
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut seen = None;
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(500), configs.recv()).await {
            Ok(Some(config)) if config == updated => {
                seen = Some(config);
                break;
            }
            Ok(Some(_)) | Err(_) => continue,
            Ok(None) => break,
        }
    }
    assert_eq!(seen, Some(updated));

    cancel.cancel();
    handle.await.unwrap();
}
