//! Session bus service.

use capy_apps::AppSystem;
use capy_bus::GtkAppProxyProvider;
use log::{info, warn};
use std::sync::Arc;

/// Connect to the session bus and hand the proxy provider to the app system.
/// Without a bus every app simply reports not busy.
pub fn connect(system: &Arc<AppSystem>, runtime: &tokio::runtime::Runtime) {
    match runtime.block_on(GtkAppProxyProvider::session()) {
        Ok(provider) => {
            system.set_proxy_provider(Arc::new(provider));
            info!("Connected to session bus");
        }
        Err(e) => warn!("No session bus, busy state disabled: {}", e),
    }
}
