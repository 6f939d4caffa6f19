//! capy-wm: Window manager abstraction for tiling window managers
//!
//! Provides a unified view of managed windows, focus, workspaces and
//! startup-notification sequences, plus a callback for WM events.
//! Currently supports Hyprland with architecture ready for Sway, Niri, etc.

pub mod state;
pub mod types;
pub mod window_backend;

#[cfg(feature = "hyprland")]
pub mod hyprland;

pub use state::WmState;
pub use types::*;
pub use window_backend::*;

use std::sync::{Arc, OnceLock, RwLock};

/// Event callback type.
/// Called when WM events occur (windows, focus, workspace changes, etc.).
pub type EventCallback = Box<dyn Fn(WmEvent) + Send + Sync>;

static EVENT_CALLBACK: OnceLock<Arc<RwLock<Option<EventCallback>>>> = OnceLock::new();

// Global state cache
static STATE: OnceLock<Arc<WmState>> = OnceLock::new();

/// Get the global state instance.
pub fn get_state() -> Arc<WmState> {
    STATE.get_or_init(|| Arc::new(WmState::new())).clone()
}

fn get_event_callback_store() -> Arc<RwLock<Option<EventCallback>>> {
    EVENT_CALLBACK
        .get_or_init(|| Arc::new(RwLock::new(None)))
        .clone()
}

/// Set the event callback.
pub fn set_event_callback<F>(callback: F)
where
    F: Fn(WmEvent) + Send + Sync + 'static,
{
    if let Ok(mut guard) = get_event_callback_store().write() {
        *guard = Some(Box::new(callback));
    }
}

/// Updates the global state cache and sends a WM event to the configured callback.
pub fn send_event(event: WmEvent) {
    get_state().apply(&event);

    if let Ok(guard) = get_event_callback_store().read() {
        if let Some(ref callback) = *guard {
            callback(event);
        }
    }
}
