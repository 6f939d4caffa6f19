//! Window tracker.
//!
//! Associates every managed window with an [`App`], follows focus and feeds
//! startup sequences to the apps they launch.

use crate::app::App;
use crate::app_system::AppSystem;
use crate::heuristics::{ResolveContext, app_for_startup_sequence, resolve};
use crate::sandbox::{FlatpakInfoReader, SandboxInfoReader};
use capy_wm::{WindowHandle, WindowId, WmEvent, WmState};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Tracker notifications.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackerEvent {
    /// Id of the newly focused app, `None` when nothing is focused.
    FocusAppChanged(Option<String>),
    TrackedWindowsChanged,
}

#[derive(Default)]
struct TrackerInner {
    window_to_app: HashMap<WindowId, Arc<App>>,
    /// Processes spawned by the shell, until they exit.
    launched_pid_to_app: HashMap<i32, Arc<App>>,
    focus_app: Option<Arc<App>>,
}

pub struct WindowTracker {
    system: Arc<AppSystem>,
    wm: Arc<WmState>,
    sandbox: Box<dyn SandboxInfoReader>,
    inner: RwLock<TrackerInner>,
    event_tx: broadcast::Sender<TrackerEvent>,
}

impl WindowTracker {
    pub fn new(system: Arc<AppSystem>, wm: Arc<WmState>) -> Self {
        Self::with_sandbox_reader(system, wm, Box::new(FlatpakInfoReader))
    }

    pub fn with_sandbox_reader(
        system: Arc<AppSystem>,
        wm: Arc<WmState>,
        sandbox: Box<dyn SandboxInfoReader>,
    ) -> Self {
        let (tx, _) = broadcast::channel(64);

        Self {
            system,
            wm,
            sandbox,
            inner: RwLock::new(TrackerInner::default()),
            event_tx: tx,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TrackerInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TrackerInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_tx.subscribe()
    }

    /// Process a WM event. The [`WmState`] cache must already reflect it.
    pub fn handle_event(&self, event: &WmEvent) {
        match event {
            WmEvent::WindowCreated(window) => self.track_window(window),
            WmEvent::WindowRemoved(id) => self.untrack_window(*id),
            WmEvent::WindowClassChanged(id) => {
                // Identity changed: drop the association and resolve from scratch.
                self.untrack_window(*id);
                if let Some(window) = self.wm.window(*id) {
                    self.track_window(&window);
                }
            }
            WmEvent::WindowChanged(id) => {
                if let Some(app) = self.window_app(*id) {
                    app.mark_windows_stale();
                }
            }
            WmEvent::FocusChanged(id) => self.update_focus_app(*id),
            WmEvent::WorkspaceSwitched(_) => {
                for app in self.tracked_apps() {
                    app.mark_windows_stale();
                }
            }
            WmEvent::StartupSequenceChanged(sequence) => {
                if let Some(app) = app_for_startup_sequence(&self.system, sequence) {
                    app.handle_startup_sequence(sequence);
                }
            }
            WmEvent::StartupSequenceRemoved(_) => {}
        }
    }

    /// Track every window already known to the WM cache.
    pub fn track_existing_windows(&self) {
        for window in self.wm.windows() {
            self.track_window(&window);
        }
        self.update_focus_app(self.wm.focus_window().map(|w| w.id()));
    }

    /// Resolve and attach a window. Tracking a tracked window does nothing.
    pub fn track_window(&self, window: &WindowHandle) {
        if self.window_app(window.id()).is_some() {
            return;
        }

        let app = match self.resolve_window(window) {
            Some(app) => app,
            None => {
                let app = App::new_for_window(window, self.system.weak());
                debug!("Window {} gets its own app {}", window.id(), app.id());
                app
            }
        };

        self.write().window_to_app.insert(window.id(), app.clone());
        app.add_window(window);

        let _ = self.event_tx.send(TrackerEvent::TrackedWindowsChanged);
    }

    /// Transient windows belong to whatever their parent belongs to.
    fn resolve_window(&self, window: &WindowHandle) -> Option<Arc<App>> {
        let inner = self.read();
        let ctx = ResolveContext {
            system: &self.system,
            wm: &self.wm,
            sandbox: self.sandbox.as_ref(),
            window_to_app: &inner.window_to_app,
            launched_pid_to_app: &inner.launched_pid_to_app,
        };

        let root = self.wm.transient_root(window);
        if root.id() != window.id() {
            return inner
                .window_to_app
                .get(&root.id())
                .cloned()
                .or_else(|| resolve(&ctx, &root));
        }

        resolve(&ctx, window)
    }

    /// Detach a window from its app. Unknown windows are ignored.
    pub fn untrack_window(&self, id: WindowId) {
        let Some(app) = self.write().window_to_app.remove(&id) else {
            return;
        };

        app.remove_window(id);
        let _ = self.event_tx.send(TrackerEvent::TrackedWindowsChanged);
    }

    fn update_focus_app(&self, focus: Option<WindowId>) {
        let window = focus.and_then(|id| self.wm.window(id));
        let app = window.as_ref().and_then(|window| {
            let root = self.wm.transient_root(window);
            self.window_app(root.id())
                .or_else(|| self.window_app(window.id()))
        });

        if let (Some(app), Some(window)) = (&app, &window) {
            app.update_window_actions(window);
        }

        let changed = {
            let mut inner = self.write();
            let previous = inner.focus_app.as_ref().map(|a| a.id().to_string());
            let current = app.as_ref().map(|a| a.id().to_string());
            inner.focus_app = app;
            (previous != current).then_some(current)
        };

        if let Some(id) = changed {
            debug!("Focus app is now {:?}", id);
            let _ = self.event_tx.send(TrackerEvent::FocusAppChanged(id));
        }
    }

    /// App owning a tracked window.
    pub fn window_app(&self, id: WindowId) -> Option<Arc<App>> {
        self.read().window_to_app.get(&id).cloned()
    }

    /// App owning a process: running apps' windows first, then shell launches.
    pub fn app_from_pid(&self, pid: i32) -> Option<Arc<App>> {
        if pid < 1 {
            return None;
        }

        self.system
            .running()
            .into_iter()
            .find(|app| app.pids().contains(&pid))
            .or_else(|| self.read().launched_pid_to_app.get(&pid).cloned())
    }

    /// Remember that the shell launched `app` as process `pid`.
    pub fn add_child_process_app(&self, pid: i32, app: Arc<App>) {
        debug!("Process {} launched for {}", pid, app.id());
        self.write().launched_pid_to_app.insert(pid, app);
    }

    pub fn child_process_exited(&self, pid: i32) {
        self.write().launched_pid_to_app.remove(&pid);
    }

    pub fn focus_app(&self) -> Option<Arc<App>> {
        self.read().focus_app.clone()
    }

    /// Every app holding at least one tracked window, whatever its run state.
    fn tracked_apps(&self) -> Vec<Arc<App>> {
        let mut apps: Vec<Arc<App>> = Vec::new();
        for app in self.read().window_to_app.values() {
            if !apps.iter().any(|seen| Arc::ptr_eq(seen, app)) {
                apps.push(app.clone());
            }
        }
        apps
    }

    /// Tracked window ids, ascending.
    pub fn tracked_windows(&self) -> Vec<WindowId> {
        let mut ids: Vec<WindowId> = self.read().window_to_app.keys().copied().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppSignal, AppState};
    use crate::app_system::tests::{entry, system_with};
    use crate::sandbox::SandboxInfo;
    use capy_wm::{StartupSequence, Window, WindowProps};
    use tokio::sync::broadcast::error::TryRecvError;

    struct NoSandbox;
    impl SandboxInfoReader for NoSandbox {
        fn read(&self, _pid: i32) -> Option<SandboxInfo> {
            None
        }
    }

    struct Fixture {
        system: Arc<AppSystem>,
        wm: Arc<WmState>,
        tracker: WindowTracker,
    }

    impl Fixture {
        fn new(entries: Vec<crate::DesktopEntry>) -> Self {
            let system = system_with(entries);
            let wm = Arc::new(WmState::new());
            let tracker =
                WindowTracker::with_sandbox_reader(system.clone(), wm.clone(), Box::new(NoSandbox));
            Self {
                system,
                wm,
                tracker,
            }
        }

        fn send(&self, event: WmEvent) {
            self.wm.apply(&event);
            self.tracker.handle_event(&event);
        }

        fn open(&self, id: u64, props: WindowProps) -> WindowHandle {
            let window = Window::new(WindowId(id), props);
            self.send(WmEvent::WindowCreated(window.clone()));
            window
        }
    }

    fn classed(instance: &str, class: &str, pid: i32) -> WindowProps {
        WindowProps {
            wm_class_instance: Some(instance.into()),
            wm_class: Some(class.into()),
            pid,
            workspace: Some(1),
            ..Default::default()
        }
    }

    fn gedit_entries() -> Vec<crate::DesktopEntry> {
        let mut gedit = entry("org.gnome.gedit.desktop", "Text Editor", "gedit");
        gedit.startup_wm_class = Some("gedit".into());
        vec![gedit]
    }

    fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    #[test]
    fn test_chromium_resolves_by_startup_wm_class() {
        let mut chromium = entry("chromium.desktop", "Chromium", "chromium");
        chromium.startup_wm_class = Some("chromium".into());
        let fx = Fixture::new(vec![chromium]);

        fx.open(1, classed("chromium", "Chromium", 300));

        let app = fx.tracker.window_app(WindowId(1)).unwrap();
        assert_eq!(app.id(), "chromium.desktop");
        assert_eq!(app.state(), AppState::Running);
        assert_eq!(fx.system.running().len(), 1);
    }

    #[test]
    fn test_child_process_wins_over_fallback() {
        let fx = Fixture::new(vec![entry("x.desktop", "X", "x")]);
        let x = fx.system.lookup_app("x.desktop").unwrap();
        fx.tracker.add_child_process_app(4242, x.clone());

        fx.open(1, classed("mystery", "Mystery", 4242));

        let app = fx.tracker.window_app(WindowId(1)).unwrap();
        assert!(Arc::ptr_eq(&app, &x));
        assert!(Arc::ptr_eq(&fx.tracker.app_from_pid(4242).unwrap(), &x));

        fx.tracker.child_process_exited(4242);
        // Still found through the running app's windows.
        assert!(Arc::ptr_eq(&fx.tracker.app_from_pid(4242).unwrap(), &x));
    }

    #[test]
    fn test_sibling_window_of_running_app_matches_by_pid() {
        let fx = Fixture::new(gedit_entries());
        fx.open(1, classed("gedit", "Gedit", 500));
        fx.open(2, classed("gedit-helper", "GeditHelper", 500));

        let first = fx.tracker.window_app(WindowId(1)).unwrap();
        let second = fx.tracker.window_app(WindowId(2)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.n_windows(), 2);
    }

    #[test]
    fn test_unknown_window_gets_window_backed_app() {
        let fx = Fixture::new(gedit_entries());
        fx.open(9, classed("xeyes", "XEyes", 900));

        let app = fx.tracker.window_app(WindowId(9)).unwrap();
        assert!(app.is_window_backed());
        assert!(app.id().starts_with("window:"));
        assert_eq!(app.state(), AppState::Running);
        assert_eq!(fx.system.running().len(), 1);

        fx.send(WmEvent::WindowRemoved(WindowId(9)));
        assert!(fx.tracker.window_app(WindowId(9)).is_none());
        assert_eq!(app.state(), AppState::Stopped);
        assert!(fx.system.running().is_empty());
    }

    #[test]
    fn test_tracking_is_idempotent() {
        let fx = Fixture::new(gedit_entries());
        let window = fx.open(1, classed("gedit", "Gedit", 500));
        let mut rx = fx.tracker.subscribe();

        fx.send(WmEvent::WindowCreated(window.clone()));
        fx.tracker.track_window(&window);

        assert_eq!(fx.tracker.window_app(WindowId(1)).unwrap().n_windows(), 1);
        assert!(drain(&mut rx).is_empty());

        fx.tracker.untrack_window(WindowId(77));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_transient_follows_parent() {
        let fx = Fixture::new(gedit_entries());
        fx.open(1, classed("gedit", "Gedit", 500));

        let mut dialog = classed("file-chooser", "FileChooser", 0);
        dialog.transient_for = Some(WindowId(1));
        fx.open(2, dialog);

        let app = fx.tracker.window_app(WindowId(2)).unwrap();
        assert_eq!(app.id(), "org.gnome.gedit.desktop");

        fx.send(WmEvent::FocusChanged(Some(WindowId(2))));
        assert_eq!(fx.tracker.focus_app().unwrap().id(), "org.gnome.gedit.desktop");
    }

    #[test]
    fn test_orphan_transient_is_window_backed() {
        let fx = Fixture::new(gedit_entries());
        let parent = Window::new(WindowId(1), classed("nothing", "Nothing", 0));
        fx.wm.apply(&WmEvent::WindowCreated(parent));

        let mut dialog = classed("gedit", "Gedit", 0);
        dialog.transient_for = Some(WindowId(1));
        fx.open(2, dialog);

        assert!(fx.tracker.window_app(WindowId(2)).unwrap().is_window_backed());
    }

    #[test]
    fn test_class_change_reassociates() {
        let fx = Fixture::new(gedit_entries());
        let window = fx.open(1, classed("splash", "Splash", 0));
        let placeholder = fx.tracker.window_app(WindowId(1)).unwrap();
        assert!(placeholder.is_window_backed());

        window.update(|p| {
            p.wm_class_instance = Some("gedit".into());
            p.wm_class = Some("Gedit".into());
        });
        fx.send(WmEvent::WindowClassChanged(WindowId(1)));

        let app = fx.tracker.window_app(WindowId(1)).unwrap();
        assert_eq!(app.id(), "org.gnome.gedit.desktop");
        assert_eq!(placeholder.state(), AppState::Stopped);
        assert_eq!(placeholder.n_windows(), 0);
        assert_eq!(fx.tracker.tracked_windows(), vec![WindowId(1)]);
    }

    #[test]
    fn test_focus_changes_publish_app() {
        let fx = Fixture::new(gedit_entries());
        fx.open(1, classed("gedit", "Gedit", 500));
        let mut rx = fx.tracker.subscribe();

        fx.send(WmEvent::FocusChanged(Some(WindowId(1))));
        fx.send(WmEvent::FocusChanged(Some(WindowId(1))));
        fx.send(WmEvent::FocusChanged(None));

        assert_eq!(
            drain(&mut rx),
            vec![
                TrackerEvent::FocusAppChanged(Some("org.gnome.gedit.desktop".into())),
                TrackerEvent::FocusAppChanged(None),
            ]
        );
        assert!(fx.tracker.focus_app().is_none());
    }

    #[test]
    fn test_startup_sequence_drives_state() {
        let fx = Fixture::new(gedit_entries());
        let app = fx.system.lookup_app("org.gnome.gedit.desktop").unwrap();
        let mut sequence = StartupSequence {
            id: "gedit-1".into(),
            application_id: Some("/usr/share/applications/org.gnome.gedit.desktop".into()),
            ..Default::default()
        };

        fx.send(WmEvent::StartupSequenceChanged(sequence.clone()));
        assert_eq!(app.state(), AppState::Starting);

        let mut props = classed("unknown", "Unknown", 0);
        props.startup_id = Some("gedit-1".into());
        fx.open(1, props);
        assert!(Arc::ptr_eq(&fx.tracker.window_app(WindowId(1)).unwrap(), &app));
        assert_eq!(app.state(), AppState::Starting);

        sequence.completed = true;
        fx.send(WmEvent::StartupSequenceChanged(sequence));
        assert_eq!(app.state(), AppState::Running);
    }

    #[test]
    fn test_workspace_switch_reorders_windows() {
        let fx = Fixture::new(gedit_entries());
        let mut first = classed("gedit", "Gedit", 500);
        first.user_time = 900;
        fx.open(1, first);
        let mut second = classed("gedit", "Gedit", 500);
        second.workspace = Some(2);
        second.user_time = 100;
        fx.open(2, second);

        let app = fx.tracker.window_app(WindowId(1)).unwrap();
        let order: Vec<WindowId> = app.windows().iter().map(|w| w.id()).collect();
        assert_eq!(order, vec![WindowId(1), WindowId(2)]);

        let mut rx = app.subscribe();
        fx.send(WmEvent::WorkspaceSwitched(2));
        assert_eq!(drain(&mut rx), vec![AppSignal::WindowsChanged]);

        let order: Vec<WindowId> = app.windows().iter().map(|w| w.id()).collect();
        assert_eq!(order, vec![WindowId(2), WindowId(1)]);
    }

    #[test]
    fn test_workspace_switch_reorders_starting_app() {
        let fx = Fixture::new(gedit_entries());
        let app = fx.system.lookup_app("org.gnome.gedit.desktop").unwrap();
        fx.send(WmEvent::StartupSequenceChanged(StartupSequence {
            id: "gedit-1".into(),
            application_id: Some("org.gnome.gedit.desktop".into()),
            ..Default::default()
        }));

        let mut first = classed("gedit", "Gedit", 500);
        first.user_time = 900;
        fx.open(1, first);
        let mut second = classed("gedit", "Gedit", 500);
        second.workspace = Some(2);
        second.user_time = 100;
        fx.open(2, second);

        assert_eq!(app.state(), AppState::Starting);
        let order: Vec<WindowId> = app.windows().iter().map(|w| w.id()).collect();
        assert_eq!(order, vec![WindowId(1), WindowId(2)]);

        fx.send(WmEvent::WorkspaceSwitched(2));

        let order: Vec<WindowId> = app.windows().iter().map(|w| w.id()).collect();
        assert_eq!(order, vec![WindowId(2), WindowId(1)]);
    }

    #[test]
    fn test_workspace_switch_reorders_skip_taskbar_windows() {
        let fx = Fixture::new(gedit_entries());
        let mut first = classed("gedit", "Gedit", 500);
        first.skip_taskbar = true;
        first.user_time = 900;
        fx.open(1, first);
        let mut second = classed("gedit", "Gedit", 500);
        second.skip_taskbar = true;
        second.workspace = Some(2);
        second.user_time = 100;
        fx.open(2, second);

        let app = fx.tracker.window_app(WindowId(1)).unwrap();
        assert_eq!(app.state(), AppState::Stopped);
        assert_eq!(app.windows()[0].id(), WindowId(1));

        fx.send(WmEvent::WorkspaceSwitched(2));
        assert_eq!(app.windows()[0].id(), WindowId(2));
    }

    #[test]
    fn test_track_existing_windows() {
        let fx = Fixture::new(gedit_entries());
        let window = Window::new(WindowId(3), classed("gedit", "Gedit", 500));
        fx.wm.apply(&WmEvent::WindowCreated(window));
        fx.wm.apply(&WmEvent::FocusChanged(Some(WindowId(3))));

        fx.tracker.track_existing_windows();

        assert_eq!(fx.tracker.tracked_windows(), vec![WindowId(3)]);
        assert_eq!(fx.tracker.focus_app().unwrap().id(), "org.gnome.gedit.desktop");
    }
}
