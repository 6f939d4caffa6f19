//! Background services feeding the control thread.
//!
//! - `apps` - Catalog directory watcher
//! - `bus` - Session bus connection for busy proxies
//! - `wm` - Window manager backend and event forwarding

pub mod apps;
pub mod bus;
pub mod wm;

use capy_apps::{AppSystem, AppsConfig, CatalogWatcher};
use capy_wm::WindowBackend;
use log::info;
use std::sync::Arc;

/// Handles that must stay alive while the daemon runs.
pub struct Services {
    pub watcher: Option<CatalogWatcher>,
    pub backend: Option<Box<dyn WindowBackend>>,
}

/// Start all background services.
/// Call this once from main after the app system is built.
pub fn start_all(system: &Arc<AppSystem>, config: &AppsConfig, runtime: &tokio::runtime::Runtime) -> Services {
    info!("Starting services...");

    bus::connect(system, runtime);
    let watcher = if config.watch_catalog {
        apps::start_watcher(config)
    } else {
        None
    };
    let backend = wm::start_backend();

    Services { watcher, backend }
}
