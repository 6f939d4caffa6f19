//! capy-apps: Application tracking for Linux desktops.
//!
//! Provides:
//! - Desktop entry catalog scanning (XDG, flatpak and snap exports) with a change watcher
//! - The application registry with id, window class and flatpak lookups
//! - Application records with run state, ordered windows and busy state
//! - Window to application matching and focus tracking

mod app;
mod app_system;
mod config;
mod dedup;
mod desktop_entry;
mod error;
mod heuristics;
mod paths;
mod sandbox;
mod source;
mod watcher;
mod window_tracker;

pub use app::{App, AppSignal, AppState, compare_windows};
pub use app_system::{AppEvent, AppSystem};
pub use config::{AppsConfig, DEFAULT_VENDOR_TOKENS};
pub use dedup::deduplicate;
pub use desktop_entry::{DesktopEntry, SANDBOX_SUFFIX, parse_desktop_entry, parse_desktop_file};
pub use error::CatalogError;
pub use heuristics::{ResolveContext, Step, app_for_startup_sequence, resolve};
pub use paths::get_config_path;
pub use sandbox::{FlatpakInfoReader, SandboxInfo, SandboxInfoReader};
pub use source::{EntrySource, XdgEntrySource};
pub use watcher::CatalogWatcher;
pub use window_tracker::{TrackerEvent, WindowTracker};

use log::warn;
use std::sync::{Arc, OnceLock};

static APP_SYSTEM: OnceLock<Arc<AppSystem>> = OnceLock::new();

/// Get the global app system, scanning the configured catalog on first use.
pub fn get_app_system() -> Arc<AppSystem> {
    APP_SYSTEM
        .get_or_init(|| {
            let config = AppsConfig::load(&get_config_path());
            let system = AppSystem::with_config(Box::new(XdgEntrySource::new(&config)), &config);
            if let Err(e) = system.reload() {
                warn!("Starting with an empty app catalog: {}", e);
            }
            system
        })
        .clone()
}

/// Convenience function to get an app by id (e.g. "firefox.desktop").
pub fn get_app(id: &str) -> Option<Arc<App>> {
    get_app_system().lookup_app(id)
}
