//! Catalog watcher service.

use crate::events::{self, ShellEvent};
use capy_apps::{AppsConfig, CatalogWatcher, EntrySource, XdgEntrySource};
use log::warn;

/// Watch the configured application directories; changes become
/// [`ShellEvent::CatalogChanged`].
pub fn start_watcher(config: &AppsConfig) -> Option<CatalogWatcher> {
    let dirs = XdgEntrySource::new(config).directories();

    match CatalogWatcher::start(dirs, || events::send(ShellEvent::CatalogChanged)) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("Catalog watcher unavailable, changes need a restart: {}", e);
            None
        }
    }
}
