//! Window manager service.
//!
//! Forwards WM events into the control thread channel.

use crate::events::{self, ShellEvent};
use capy_wm::WindowBackend;
use log::{info, warn};

/// Detect the WM, start its listener and request the initial state.
pub fn start_backend() -> Option<Box<dyn WindowBackend>> {
    capy_wm::set_event_callback(|event| events::send(ShellEvent::Wm(event)));

    let Some(backend) = capy_wm::create_backend() else {
        warn!("Unsupported window manager ({}), no windows will be tracked", capy_wm::detect_wm());
        return None;
    };

    info!("Using {} backend", capy_wm::detect_wm());
    backend.start_listener();
    backend.trigger_refresh();
    Some(backend)
}
