//! Client (window) synchronisation for Hyprland.

use crate::types::{Window, WindowId, WindowProps, WindowType};
use crate::{WmEvent, get_state, send_event};
use hyprland::data::{Client, Clients, Monitors};
use hyprland::shared::{HyprData, HyprDataActiveOptional, HyprDataVec};
use log::debug;
use std::collections::HashSet;
use std::sync::Mutex;

// Serialises resyncs coming from the listener thread and explicit refreshes.
static SYNC_LOCK: Mutex<()> = Mutex::new(());

/// Parse a Hyprland window address ("0x55d0c1a2b3c0") into a window id.
pub(crate) fn parse_address(address: &str) -> Option<WindowId> {
    let hex = address.trim().trim_start_matches("0x");
    u64::from_str_radix(hex, 16).ok().map(WindowId)
}

/// Hyprland keeps a focus history where 0 is the most recently focused
/// window. Invert it into a growing "user time".
fn user_time_from_focus_history(focus_history_id: i8) -> u32 {
    if focus_history_id < 0 {
        0
    } else {
        (i8::MAX - focus_history_id) as u32 + 1
    }
}

fn props_from_client(client: &Client) -> WindowProps {
    let special = client.workspace.name.starts_with("special");

    WindowProps {
        wm_class_instance: non_empty(&client.initial_class),
        wm_class: non_empty(&client.class),
        // Native Wayland clients report their app_id as the class.
        app_id: if client.xwayland {
            None
        } else {
            non_empty(&client.class)
        },
        pid: client.pid,
        workspace: Some(client.workspace.id),
        minimized: special,
        user_time: user_time_from_focus_history(client.focus_history_id),
        window_type: WindowType::Normal,
        title: client.title.clone(),
        ..Default::default()
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Resync all clients against the cached state and emit the differences.
pub(crate) fn sync() {
    let _guard = SYNC_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let state = get_state();

    if let Some(active_ws) = Monitors::get()
        .ok()
        .and_then(|monitors| {
            monitors
                .iter()
                .find(|m| m.focused)
                .map(|m| m.active_workspace.id)
        })
    {
        if active_ws != state.active_workspace() {
            send_event(WmEvent::WorkspaceSwitched(active_ws));
        }
    }

    let clients: Vec<Client> = Clients::get().map(|c| c.to_vec()).unwrap_or_default();
    let mut seen = HashSet::new();

    for client in &clients {
        let Some(id) = parse_address(&client.address.to_string()) else {
            debug!("Skipping client with unparsable address {}", client.address);
            continue;
        };
        seen.insert(id);

        let mut props = props_from_client(client);

        match state.window(id) {
            Some(window) => {
                let old = window.props();
                props.on_active_workspace = old.on_active_workspace;
                if old == props {
                    continue;
                }
                let class_changed = old.wm_class != props.wm_class
                    || old.wm_class_instance != props.wm_class_instance
                    || old.app_id != props.app_id;
                window.set_props(props);
                if class_changed {
                    send_event(WmEvent::WindowClassChanged(id));
                } else {
                    send_event(WmEvent::WindowChanged(id));
                }
            }
            None => send_event(WmEvent::WindowCreated(Window::new(id, props))),
        }
    }

    for window in state.windows() {
        if !seen.contains(&window.id()) {
            send_event(WmEvent::WindowRemoved(window.id()));
        }
    }

    let focused = match Client::get_active() {
        Ok(Some(active)) => parse_address(&active.address.to_string()),
        _ => None,
    };
    if focused != state.focus_window().map(|w| w.id()) {
        send_event(WmEvent::FocusChanged(focused));
    }
}
