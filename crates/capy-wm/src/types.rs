//! Core types for window manager abstraction.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Detected window manager type.
/// More will come soon (define soon)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WmType {
    Hyprland,
    Sway,
    Niri,
    Unknown,
}

impl std::fmt::Display for WmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WmType::Hyprland => write!(f, "Hyprland"),
            WmType::Sway => write!(f, "Sway"),
            WmType::Niri => write!(f, "Niri"),
            WmType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Compositor-assigned window identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identifier of a window group (X11 group leader or equivalent).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupId(pub u64);

/// Window type as reported by the compositor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WindowType {
    #[default]
    Normal,
    Dialog,
    ModalDialog,
    Utility,
    Splash,
    Menu,
    Dock,
    Desktop,
    Other,
}

/// D-Bus identity a GTK client publishes on its window.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GtkIdentity {
    /// Unique bus name of the client connection (e.g. ":1.42").
    pub unique_bus_name: Option<String>,
    /// Object path of the application's action group.
    pub application_object_path: Option<String>,
    /// Object path of this window's action group.
    pub window_object_path: Option<String>,
}

/// Snapshot of everything the app tracker reads from a window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WindowProps {
    /// WM_CLASS instance part (res_name).
    pub wm_class_instance: Option<String>,
    /// WM_CLASS class part (res_class).
    pub wm_class: Option<String>,
    /// Application id declared by the client (Wayland app_id / GTK application id).
    pub app_id: Option<String>,
    /// Client process id, 0 when unknown.
    pub pid: i32,
    /// Headless or otherwise remote window.
    pub remote: bool,
    pub skip_taskbar: bool,
    pub transient_for: Option<WindowId>,
    /// Workspace the window lives on; `None` means all workspaces.
    pub workspace: Option<i32>,
    /// Kept in sync by [`crate::WmState`] from `workspace` and the active workspace.
    pub on_active_workspace: bool,
    pub minimized: bool,
    /// Timestamp of the last user interaction.
    pub user_time: u32,
    pub group: Option<GroupId>,
    pub window_type: WindowType,
    /// Startup-notification id the window was launched with.
    pub startup_id: Option<String>,
    pub title: String,
    pub gtk: GtkIdentity,
}

static NEXT_STABLE_SEQUENCE: AtomicU32 = AtomicU32::new(1);

/// A live window. Shared between the WM backend and the app tracker.
#[derive(Debug)]
pub struct Window {
    id: WindowId,
    stable_sequence: u32,
    props: RwLock<WindowProps>,
}

/// Shared handle to a window.
pub type WindowHandle = Arc<Window>;

impl Window {
    pub fn new(id: WindowId, props: WindowProps) -> WindowHandle {
        Arc::new(Self {
            id,
            stable_sequence: NEXT_STABLE_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            props: RwLock::new(props),
        })
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    /// Small process-unique number, assigned in creation order.
    pub fn stable_sequence(&self) -> u32 {
        self.stable_sequence
    }

    /// Clone of the current properties.
    pub fn props(&self) -> WindowProps {
        self.props
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace all properties at once.
    pub fn set_props(&self, props: WindowProps) {
        *self.props.write().unwrap_or_else(PoisonError::into_inner) = props;
    }

    /// Mutate properties in place.
    pub fn update(&self, f: impl FnOnce(&mut WindowProps)) {
        f(&mut self.props.write().unwrap_or_else(PoisonError::into_inner));
    }

    fn with<T>(&self, f: impl FnOnce(&WindowProps) -> T) -> T {
        f(&self.props.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn wm_class(&self) -> Option<String> {
        self.with(|p| p.wm_class.clone())
    }

    pub fn wm_class_instance(&self) -> Option<String> {
        self.with(|p| p.wm_class_instance.clone())
    }

    pub fn app_id(&self) -> Option<String> {
        self.with(|p| p.app_id.clone())
    }

    pub fn pid(&self) -> i32 {
        self.with(|p| p.pid)
    }

    pub fn is_remote(&self) -> bool {
        self.with(|p| p.remote)
    }

    pub fn is_skip_taskbar(&self) -> bool {
        self.with(|p| p.skip_taskbar)
    }

    pub fn transient_for(&self) -> Option<WindowId> {
        self.with(|p| p.transient_for)
    }

    pub fn is_on_active_workspace(&self) -> bool {
        self.with(|p| p.on_active_workspace)
    }

    /// Visible on its workspace, i.e. not minimized.
    pub fn is_showing(&self) -> bool {
        self.with(|p| !p.minimized)
    }

    pub fn user_time(&self) -> u32 {
        self.with(|p| p.user_time)
    }

    pub fn group(&self) -> Option<GroupId> {
        self.with(|p| p.group)
    }

    pub fn window_type(&self) -> WindowType {
        self.with(|p| p.window_type)
    }

    pub fn startup_id(&self) -> Option<String> {
        self.with(|p| p.startup_id.clone())
    }

    pub fn title(&self) -> String {
        self.with(|p| p.title.clone())
    }

    pub fn gtk_identity(&self) -> GtkIdentity {
        self.with(|p| p.gtk.clone())
    }
}

/// A startup-notification sequence (launch feedback).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StartupSequence {
    /// Startup id, matched against [`WindowProps::startup_id`].
    pub id: String,
    /// Application id or desktop file path the launcher announced.
    pub application_id: Option<String>,
    pub completed: bool,
}

/// Events emitted by the window manager backend.
#[derive(Clone, Debug)]
pub enum WmEvent {
    /// A new window is managed.
    WindowCreated(WindowHandle),
    /// A window was closed or unmanaged.
    WindowRemoved(WindowId),
    /// WM_CLASS or declared application id changed at runtime.
    WindowClassChanged(WindowId),
    /// Some other tracked property changed (workspace, user time, minimized).
    WindowChanged(WindowId),
    /// Keyboard focus moved, `None` when nothing is focused.
    FocusChanged(Option<WindowId>),
    /// The active workspace changed.
    WorkspaceSwitched(i32),
    /// A startup sequence was added or updated.
    StartupSequenceChanged(StartupSequence),
    /// A startup sequence went away.
    StartupSequenceRemoved(String),
}
