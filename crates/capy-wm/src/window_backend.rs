use crate::WmType;
#[cfg(feature = "hyprland")]
use crate::hyprland;

/// Trait that all window manager backends must implement.
/// This provides a unified interface regardless of the underlying WM.
pub trait WindowBackend: Send + Sync {
    /// Start the background event listener.
    /// This spawns a thread that monitors WM events and publishes them through
    /// [`crate::send_event`].
    fn start_listener(&self);

    /// Re-read all windows, focus and workspace state from the compositor,
    /// emitting events for everything that differs from the cache.
    fn trigger_refresh(&self);
}

/// Detect the current window manager from environment variables.
pub fn detect_wm() -> WmType {
    if let Ok(desktop) = std::env::var("XDG_CURRENT_DESKTOP") {
        let desktop_lower = desktop.to_lowercase();
        if desktop_lower.contains("hyprland") {
            return WmType::Hyprland;
        }
        if desktop_lower.contains("sway") {
            return WmType::Sway;
        }
        if desktop_lower.contains("niri") {
            return WmType::Niri;
        }
    }

    // Specific Wm checks
    if std::env::var("HYPRLAND_INSTANCE_SIGNATURE").is_ok() {
        return WmType::Hyprland;
    }

    if std::env::var("SWAYSOCK").is_ok() {
        return WmType::Sway;
    }

    if std::env::var("NIRI_SOCKET").is_ok() {
        return WmType::Niri;
    }

    WmType::Unknown
}

/// Create the appropriate backend for the detected window manager.
/// Returns None if no supported WM is detected.
pub fn create_backend() -> Option<Box<dyn WindowBackend>> {
    match detect_wm() {
        #[cfg(feature = "hyprland")]
        WmType::Hyprland => Some(Box::new(hyprland::HyprlandBackend::new())),

        // Future backends:
        // WmType::Sway => Some(Box::new(sway::SwayBackend::new())),
        // WmType::Niri => Some(Box::new(niri::NiriBackend::new())),
        _ => None,
    }
}
