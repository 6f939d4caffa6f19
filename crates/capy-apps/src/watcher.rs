//! Catalog change notification.

use crate::error::CatalogError;
use log::{debug, info, warn};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;

/// Watches application directories and fires a callback on any change.
/// Dropping the watcher stops watching.
pub struct CatalogWatcher {
    _watcher: RecommendedWatcher,
}

impl CatalogWatcher {
    /// Start watching `dirs` recursively.
    pub fn start<F>(dirs: Vec<PathBuf>, on_change: F) -> Result<Self, CatalogError>
    where
        F: Fn() + Send + 'static,
    {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event.kind.is_access() {
                    return;
                }
                debug!("Catalog change: {:?} {:?}", event.kind, event.paths);
                on_change();
            }
            Err(e) => warn!("Catalog watch error: {}", e),
        })?;

        let mut watched = 0;
        for dir in dirs {
            match watcher.watch(&dir, RecursiveMode::Recursive) {
                Ok(()) => watched += 1,
                Err(e) => warn!("Cannot watch {}: {}", dir.display(), e),
            }
        }

        info!("Watching {} application directories", watched);
        Ok(Self { _watcher: watcher })
    }
}
