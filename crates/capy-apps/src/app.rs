//! Application records.
//!
//! An [`App`] is either backed by a desktop entry or, when no entry matches,
//! by a single window. It owns the run state machine and the live window list.

use crate::app_system::AppSystem;
use crate::desktop_entry::DesktopEntry;
use capy_bus::actions::{APP_PREFIX, WIN_PREFIX};
use capy_bus::{ActionMuxer, BusyWatch};
use capy_wm::{StartupSequence, WindowHandle, WindowId};
use log::{debug, error};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Run state of an application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AppState {
    #[default]
    Stopped,
    Starting,
    Running,
}

/// Per-application notifications.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppSignal {
    StateChanged(AppState),
    WindowsChanged,
    BusyChanged(bool),
}

enum Backing {
    Entry(DesktopEntry),
    Window(WindowHandle),
}

struct TrackedWindow {
    handle: WindowHandle,
    /// Whether this window was counted as interesting when attached.
    interesting: bool,
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Exists exactly while the app has windows.
struct RunningState {
    windows: Vec<TrackedWindow>,
    window_sort_stale: bool,
    interesting_windows: usize,
    muxer: ActionMuxer,
    /// Distinguishes this running period from earlier ones for late async completions.
    generation: u64,
    busy: Option<BusyWatch>,
    fetch_task: Option<JoinHandle<()>>,
    busy_task: Option<JoinHandle<()>>,
}

impl RunningState {
    fn new(first_window: &WindowHandle) -> Self {
        let mut muxer = ActionMuxer::new();
        let gtk = first_window.gtk_identity();
        if let Some(bus_name) = &gtk.unique_bus_name {
            if let Some(path) = &gtk.application_object_path {
                muxer.insert(APP_PREFIX, bus_name, path);
            }
            if let Some(path) = &gtk.window_object_path {
                muxer.insert(WIN_PREFIX, bus_name, path);
            }
        }

        Self {
            windows: Vec::new(),
            window_sort_stale: false,
            interesting_windows: 0,
            muxer,
            generation: NEXT_GENERATION.fetch_add(1, AtomicOrdering::Relaxed),
            busy: None,
            fetch_task: None,
            busy_task: None,
        }
    }
}

impl Drop for RunningState {
    fn drop(&mut self) {
        if let Some(task) = self.fetch_task.take() {
            task.abort();
        }
        if let Some(task) = self.busy_task.take() {
            task.abort();
        }
    }
}

struct AppInner {
    backing: Backing,
    state: AppState,
    unique_name: Option<String>,
    hidden_as_duplicate: bool,
    running_state: Option<RunningState>,
}

impl AppInner {
    fn has_window(&self, id: WindowId) -> bool {
        self.running_state
            .as_ref()
            .is_some_and(|rs| rs.windows.iter().any(|w| w.handle.id() == id))
    }

    fn interesting_windows(&self) -> usize {
        self.running_state
            .as_ref()
            .map_or(0, |rs| rs.interesting_windows)
    }

    /// Apply a transition; returns the new state when it changed.
    fn transition(&mut self, id: &str, state: AppState) -> Option<AppState> {
        if self.state == state {
            return None;
        }

        let forbidden = self.state == AppState::Running && state == AppState::Starting;
        debug_assert!(!forbidden, "app {} went from running back to starting", id);
        if forbidden {
            error!("Ignoring running -> starting transition for {}", id);
            return None;
        }

        debug!("App {}: {:?} -> {:?}", id, self.state, state);
        self.state = state;
        Some(state)
    }

    /// Starting is left only through a startup sequence or the last window going away.
    fn sync_running_state(&mut self, id: &str) -> Option<AppState> {
        if self.state == AppState::Starting {
            return None;
        }
        if self.interesting_windows() == 0 {
            self.transition(id, AppState::Stopped)
        } else {
            self.transition(id, AppState::Running)
        }
    }
}

/// Ordering used by [`App::windows`]: windows on the active workspace first,
/// then visible before minimized, then most recently used first.
pub fn compare_windows(a: &WindowHandle, b: &WindowHandle) -> Ordering {
    b.is_on_active_workspace()
        .cmp(&a.is_on_active_workspace())
        .then_with(|| b.is_showing().cmp(&a.is_showing()))
        .then_with(|| b.user_time().cmp(&a.user_time()))
}

/// A launchable or running application.
pub struct App {
    id: String,
    inner: RwLock<AppInner>,
    system: Weak<AppSystem>,
    event_tx: broadcast::Sender<AppSignal>,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl App {
    fn new(id: String, backing: Backing, system: Weak<AppSystem>) -> Arc<Self> {
        let (tx, _) = broadcast::channel(16);

        Arc::new(Self {
            id,
            inner: RwLock::new(AppInner {
                backing,
                state: AppState::Stopped,
                unique_name: None,
                hidden_as_duplicate: false,
                running_state: None,
            }),
            system,
            event_tx: tx,
        })
    }

    pub(crate) fn new_for_entry(entry: DesktopEntry, system: Weak<AppSystem>) -> Arc<Self> {
        Self::new(entry.id.clone(), Backing::Entry(entry), system)
    }

    /// Synthesize an app for a window no desktop entry claims.
    pub(crate) fn new_for_window(window: &WindowHandle, system: Weak<AppSystem>) -> Arc<Self> {
        let id = format!("window:{}", window.stable_sequence());
        Self::new(id, Backing::Window(window.clone()), system)
    }

    fn read(&self) -> RwLockReadGuard<'_, AppInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AppInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_window_backed(&self) -> bool {
        matches!(self.read().backing, Backing::Window(_))
    }

    /// Copy of the backing desktop entry, `None` for window-backed apps.
    pub fn entry(&self) -> Option<DesktopEntry> {
        match &self.read().backing {
            Backing::Entry(entry) => Some(entry.clone()),
            Backing::Window(_) => None,
        }
    }

    /// Swap the backing entry in place; identity, names and windows are kept.
    pub(crate) fn set_entry(&self, entry: DesktopEntry) {
        let mut inner = self.write();
        if let Backing::Entry(current) = &mut inner.backing {
            *current = entry;
        }
    }

    /// Name as declared by the entry, or the window class for window-backed apps.
    pub fn common_name(&self) -> String {
        match &self.read().backing {
            Backing::Entry(entry) => entry.name.clone(),
            Backing::Window(window) => window
                .wm_class()
                .or_else(|| Some(window.title()).filter(|t| !t.is_empty()))
                .unwrap_or_else(|| "Unknown".to_string()),
        }
    }

    /// Name set by deduplication, if this app's name collided with another.
    pub fn unique_name(&self) -> Option<String> {
        self.read().unique_name.clone()
    }

    pub(crate) fn set_unique_name(&self, name: String) {
        self.write().unique_name = Some(name);
    }

    /// Display name: the unique name when one was assigned.
    pub fn name(&self) -> String {
        if let Some(unique) = self.unique_name() {
            return unique;
        }
        self.common_name()
    }

    pub fn is_hidden_as_duplicate(&self) -> bool {
        self.read().hidden_as_duplicate
    }

    pub(crate) fn set_hidden_as_duplicate(&self, hidden: bool) {
        self.write().hidden_as_duplicate = hidden;
    }

    /// Undo a previous duplicate marking along with the name copied from the
    /// kept record. Returns whether the app was hidden.
    pub(crate) fn release_duplicate(&self) -> bool {
        let mut inner = self.write();
        if !inner.hidden_as_duplicate {
            return false;
        }
        inner.hidden_as_duplicate = false;
        inner.unique_name = None;
        true
    }

    fn entry_field<T>(&self, f: impl FnOnce(&DesktopEntry) -> Option<T>) -> Option<T> {
        match &self.read().backing {
            Backing::Entry(entry) => f(entry),
            Backing::Window(_) => None,
        }
    }

    pub fn description(&self) -> Option<String> {
        self.entry_field(|e| e.comment.clone())
    }

    pub fn icon_name(&self) -> Option<String> {
        self.entry_field(|e| e.icon_name.clone())
    }

    pub fn executable(&self) -> Option<String> {
        self.entry_field(|e| e.executable())
    }

    pub fn executable_basename(&self) -> Option<String> {
        self.entry_field(|e| e.executable_basename())
    }

    pub fn flatpak_app_id(&self) -> Option<String> {
        self.entry_field(|e| e.flatpak_app_id.clone())
    }

    pub fn is_sandboxed(&self) -> bool {
        self.flatpak_app_id().is_some()
    }

    pub fn no_display(&self) -> bool {
        self.entry_field(|e| Some(e.no_display)).unwrap_or(false)
    }

    /// Source .desktop file of entry-backed apps.
    pub fn desktop_file_path(&self) -> Option<PathBuf> {
        self.entry_field(|e| Some(e.desktop_file_path.clone()))
    }

    pub fn state(&self) -> AppState {
        self.read().state
    }

    /// Windows in display order, re-sorted only when the order went stale.
    pub fn windows(&self) -> Vec<WindowHandle> {
        let mut inner = self.write();
        let Some(running) = inner.running_state.as_mut() else {
            return Vec::new();
        };

        if running.window_sort_stale {
            running
                .windows
                .sort_by(|a, b| compare_windows(&a.handle, &b.handle));
            running.window_sort_stale = false;
        }

        running.windows.iter().map(|w| w.handle.clone()).collect()
    }

    pub fn n_windows(&self) -> usize {
        self.read()
            .running_state
            .as_ref()
            .map_or(0, |rs| rs.windows.len())
    }

    /// Windows counted towards the run state (not skip-taskbar).
    pub fn interesting_window_count(&self) -> usize {
        self.read().interesting_windows()
    }

    pub fn has_window(&self, id: WindowId) -> bool {
        self.read().has_window(id)
    }

    /// Distinct client pids of this app's windows.
    pub fn pids(&self) -> Vec<i32> {
        let mut pids: Vec<i32> = self
            .read()
            .running_state
            .as_ref()
            .map(|rs| rs.windows.iter().map(|w| w.handle.pid()).collect())
            .unwrap_or_default();
        pids.retain(|pid| *pid > 0);
        pids.sort_unstable();
        pids.dedup();
        pids
    }

    /// True only once a busy proxy is installed and the remote side reports busy.
    pub fn is_busy(&self) -> bool {
        self.read()
            .running_state
            .as_ref()
            .and_then(|rs| rs.busy.as_ref())
            .is_some_and(|busy| *busy.borrow())
    }

    /// Remote action groups of the running app.
    pub fn action_muxer(&self) -> Option<ActionMuxer> {
        self.read().running_state.as_ref().map(|rs| rs.muxer.clone())
    }

    /// Subscribe to this app's notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<AppSignal> {
        self.event_tx.subscribe()
    }

    /// Send the notifications collected by one operation, windows first.
    fn emit_changes(self: &Arc<Self>, windows_changed: bool, new_state: Option<AppState>) {
        if windows_changed {
            let _ = self.event_tx.send(AppSignal::WindowsChanged);
        }
        if let Some(state) = new_state {
            if let Some(system) = self.system.upgrade() {
                system.notify_app_state_changed(self);
            }
            let _ = self.event_tx.send(AppSignal::StateChanged(state));
        }
    }

    /// Attach a window. Attaching an attached window does nothing.
    pub(crate) fn add_window(self: &Arc<Self>, window: &WindowHandle) {
        let (new_state, started) = {
            let mut inner = self.write();
            if inner.has_window(window.id()) {
                return;
            }

            let created = inner.running_state.is_none();
            let running = inner
                .running_state
                .get_or_insert_with(|| RunningState::new(window));

            let interesting = !window.is_skip_taskbar();
            running.windows.push(TrackedWindow {
                handle: window.clone(),
                interesting,
            });
            running.window_sort_stale = true;
            if interesting {
                running.interesting_windows += 1;
            }
            let generation = running.generation;

            (inner.sync_running_state(&self.id), created.then_some(generation))
        };

        if let Some(generation) = started {
            self.start_busy_fetch(generation, window);
        }

        self.emit_changes(true, new_state);
    }

    /// Detach a window. Detaching an unknown window does nothing.
    pub(crate) fn remove_window(self: &Arc<Self>, id: WindowId) {
        let new_state = {
            let mut inner = self.write();
            let Some(running) = inner.running_state.as_mut() else {
                return;
            };
            let Some(pos) = running.windows.iter().position(|w| w.handle.id() == id) else {
                return;
            };

            let removed = running.windows.remove(pos);
            if removed.interesting {
                running.interesting_windows = running.interesting_windows.saturating_sub(1);
            }

            if running.windows.is_empty() {
                // Dropping the running state cancels any in-flight busy fetch.
                inner.running_state = None;
                inner.transition(&self.id, AppState::Stopped)
            } else {
                inner.sync_running_state(&self.id)
            }
        };

        self.emit_changes(true, new_state);
    }

    /// React to a startup sequence that belongs to this app.
    pub(crate) fn handle_startup_sequence(self: &Arc<Self>, sequence: &StartupSequence) {
        let new_state = {
            let mut inner = self.write();
            if !sequence.completed {
                if inner.state == AppState::Stopped {
                    inner.transition(&self.id, AppState::Starting)
                } else {
                    None
                }
            } else if inner.interesting_windows() > 0 {
                inner.transition(&self.id, AppState::Running)
            } else {
                inner.transition(&self.id, AppState::Stopped)
            }
        };

        self.emit_changes(false, new_state);
    }

    /// Window order depends on workspace, visibility or user time that changed.
    pub(crate) fn mark_windows_stale(self: &Arc<Self>) {
        {
            let mut inner = self.write();
            let Some(running) = inner.running_state.as_mut() else {
                return;
            };
            running.window_sort_stale = true;
        }
        self.emit_changes(true, None);
    }

    /// Point the `win` action group at `window` (the focused one).
    pub(crate) fn update_window_actions(&self, window: &WindowHandle) {
        let gtk = window.gtk_identity();
        let (Some(bus_name), Some(path)) = (gtk.unique_bus_name, gtk.window_object_path) else {
            return;
        };

        let mut inner = self.write();
        if let Some(running) = inner.running_state.as_mut() {
            if running.windows.iter().any(|w| w.handle.id() == window.id()) {
                running.muxer.insert(WIN_PREFIX, &bus_name, &path);
            }
        }
    }

    fn start_busy_fetch(self: &Arc<Self>, generation: u64, window: &WindowHandle) {
        let gtk = window.gtk_identity();
        let (Some(bus_name), Some(object_path)) = (gtk.unique_bus_name, gtk.application_object_path)
        else {
            return;
        };
        let Some(provider) = self.system.upgrade().and_then(|s| s.proxy_provider()) else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, skipping busy proxy for {}", self.id);
            return;
        };

        let request = provider.app_proxy(&bus_name, &object_path);
        // The task keeps the app alive until the fetch settles.
        let app = Arc::clone(self);
        let task = runtime.spawn(async move {
            match request.await {
                Ok(busy) => app.install_busy_watch(generation, busy),
                Err(e) => debug!("No busy proxy for {}: {}", app.id, e),
            }
        });

        let mut inner = self.write();
        match inner.running_state.as_mut() {
            Some(running) if running.generation == generation => running.fetch_task = Some(task),
            _ => task.abort(),
        }
    }

    fn install_busy_watch(self: &Arc<Self>, generation: u64, busy: BusyWatch) {
        let initially_busy = *busy.borrow();
        {
            let mut inner = self.write();
            let Some(running) = inner
                .running_state
                .as_mut()
                .filter(|rs| rs.generation == generation)
            else {
                debug!("Discarding late busy proxy for {}", self.id);
                return;
            };

            let mut changes = busy.clone();
            let app = Arc::downgrade(self);
            running.busy_task = Some(tokio::spawn(async move {
                while changes.changed().await.is_ok() {
                    let value = *changes.borrow_and_update();
                    let Some(app) = app.upgrade() else {
                        break;
                    };
                    let _ = app.event_tx.send(AppSignal::BusyChanged(value));
                }
            }));
            running.busy = Some(busy);
        }

        if initially_busy {
            let _ = self.event_tx.send(AppSignal::BusyChanged(true));
        }
    }
}
