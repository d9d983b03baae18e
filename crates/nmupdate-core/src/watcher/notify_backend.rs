//! `notify`-based [`PathWatcher`]
//!
//! Bridges the synchronous `notify` callback into an unbounded tokio channel
//! and narrows the event kinds to the four the config watcher acts on.

use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::error::Result;
use crate::traits::{FileEvent, PathWatcher};

/// Watches single files with the platform's recommended `notify` backend
pub struct NotifyPathWatcher {
    inner: RecommendedWatcher,
}

impl NotifyPathWatcher {
    /// Create a watcher and the receiver its events are delivered on
    pub fn new() -> Result<(Self, mpsc::UnboundedReceiver<FileEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let inner = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    trace!(kind = ?event.kind, paths = ?event.paths, "raw file event");
                    if let Some(kind) = classify(&event.kind) {
                        // Receiver gone means the config watcher has stopped
                        let _ = tx.send(kind);
                    }
                }
                Err(e) => {
                    error!("file watcher error: {e}");
                }
            }
        })?;

        Ok((Self { inner }, rx))
    }
}

impl PathWatcher for NotifyPathWatcher {
    fn watch(&mut self, path: &Path) -> Result<()> {
        self.inner.watch(path, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<()> {
        self.inner.unwatch(path)?;
        Ok(())
    }
}

/// Map a `notify` event kind onto a [`FileEvent`]
///
/// A rename of the watched file is reported as [`FileEvent::Remove`]: the
/// watch follows the old inode, so the path has to be re-watched either way.
pub fn classify(kind: &EventKind) -> Option<FileEvent> {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(FileEvent::CloseWrite),
        EventKind::Modify(ModifyKind::Data(_)) => Some(FileEvent::Modify),
        EventKind::Modify(ModifyKind::Any) | EventKind::Modify(ModifyKind::Other) => {
            Some(FileEvent::Write)
        }
        EventKind::Modify(ModifyKind::Name(_)) => Some(FileEvent::Remove),
        EventKind::Remove(_) => Some(FileEvent::Remove),
        _ => None,
    }
}
