//! Hyprland backend for capy-wm.
//!
//! Implements the WindowBackend trait for the Hyprland compositor.
//! Every relevant IPC event triggers a full client resync; the diff against
//! the cached [`crate::WmState`] becomes [`crate::WmEvent`]s.

mod clients;

use crate::WindowBackend;
use hyprland::event_listener::EventListener;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

static RUNNING: AtomicBool = AtomicBool::new(false);

/// Hyprland window manager backend.
pub struct HyprlandBackend;

impl HyprlandBackend {
    /// Create a new Hyprland backend instance.
    pub fn new() -> Self {
        Self
    }
}

impl Default for HyprlandBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowBackend for HyprlandBackend {
    fn start_listener(&self) {
        if RUNNING.swap(true, Ordering::SeqCst) {
            info!("Hyprland listener already running");
            return;
        }

        info!("Starting Hyprland event listener...");

        thread::spawn(move || {
            let mut listener = EventListener::new();

            listener.add_workspace_changed_handler(|ws| {
                debug!("Workspace changed event: {:?}", ws);
                clients::sync();
            });

            listener.add_active_window_changed_handler(|win| {
                debug!("Active window changed: {:?}", win);
                clients::sync();
            });

            listener.add_window_opened_handler(|win| {
                debug!("Window opened: {:?}", win);
                clients::sync();
            });

            listener.add_window_closed_handler(|addr| {
                debug!("Window closed: {:?}", addr);
                clients::sync();
            });

            listener.add_window_title_changed_handler(|data| {
                debug!("Window title changed: {:?}", data.title);
                clients::sync();
            });

            info!("Hyprland event listener active");
            if let Err(e) = listener.start_listener() {
                error!("Hyprland listener failed: {}", e);
                RUNNING.store(false, Ordering::SeqCst);
            }
        });
    }

    fn trigger_refresh(&self) {
        info!("Triggering Hyprland state refresh...");
        clients::sync();
    }
}
