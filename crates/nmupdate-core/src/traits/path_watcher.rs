// # Path Watcher Trait
//
// Defines the filesystem watch primitive used by the config watcher.
//
// A `PathWatcher` is created together with an event receiver. `watch` and
// `unwatch` control which path feeds that receiver. The `notify`-based
// implementation lives in `crate::watcher::notify_backend`.

use std::path::Path;

/// Kind of change observed on a watched path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEvent {
    /// Data was written
    Write,
    /// Content was modified
    Modify,
    /// A writer closed the file
    CloseWrite,
    /// The path was removed or moved away
    Remove,
}

impl FileEvent {
    /// Whether the file content may have changed in place
    pub fn is_content_change(self) -> bool {
        matches!(self, Self::Write | Self::Modify | Self::CloseWrite)
    }
}

/// Trait for filesystem watch backends
pub trait PathWatcher: Send {
    /// Start delivering events for `path`
    fn watch(&mut self, path: &Path) -> Result<(), crate::Error>;

    /// Stop delivering events for `path`
    fn unwatch(&mut self, path: &Path) -> Result<(), crate::Error>;
}
