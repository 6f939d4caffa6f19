//! Application registry.
//!
//! Owns every entry-backed [`App`], keeps the secondary lookup indexes and
//! the set of currently running applications.

use crate::app::{App, AppState};
use crate::config::{AppsConfig, DEFAULT_VENDOR_TOKENS};
use crate::dedup::deduplicate;
use crate::desktop_entry::{DesktopEntry, SANDBOX_SUFFIX};
use crate::error::CatalogError;
use crate::source::EntrySource;
use capy_bus::AppProxyProvider;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::sync::broadcast;

/// Registry notifications.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppEvent {
    /// The installed application set was reloaded.
    InstalledChanged,
    /// An application changed run state.
    AppStateChanged { id: String, state: AppState },
}

#[derive(Default)]
struct Registry {
    apps: HashMap<String, Arc<App>>,
    /// Startup window class (suffixed for sandboxed entries) to app id.
    by_startup_wm_class: HashMap<String, String>,
    /// Flatpak application id to app id.
    by_flatpak_id: HashMap<String, String>,
    vendor_prefixes: HashSet<String>,
}

impl Registry {
    fn rebuild_indexes(&mut self) {
        self.by_startup_wm_class.clear();
        self.by_flatpak_id.clear();

        let mut ids: Vec<&String> = self.apps.keys().collect();
        ids.sort();

        for id in ids {
            let Some(entry) = self.apps.get(id).and_then(|app| app.entry()) else {
                continue;
            };

            if let Some(key) = entry.startup_wm_class_key() {
                self.by_startup_wm_class
                    .entry(key)
                    .or_insert_with(|| id.clone());
            }

            if let Some(flatpak_id) = &entry.flatpak_app_id {
                let base = id.strip_suffix(SANDBOX_SUFFIX).unwrap_or(id);
                if base.strip_suffix(".desktop") == Some(flatpak_id.as_str()) {
                    self.by_flatpak_id
                        .entry(flatpak_id.clone())
                        .or_insert_with(|| id.clone());
                }
            }
        }
    }
}

/// The application registry.
pub struct AppSystem {
    weak_self: Weak<AppSystem>,
    source: Box<dyn EntrySource>,
    vendor_tokens: Vec<String>,
    registry: RwLock<Registry>,
    running: RwLock<HashMap<String, Arc<App>>>,
    proxy_provider: RwLock<Option<Arc<dyn AppProxyProvider>>>,
    event_tx: broadcast::Sender<AppEvent>,
}

impl AppSystem {
    /// Create an empty registry; call [`Self::reload`] to populate it.
    pub fn new(source: Box<dyn EntrySource>) -> Arc<Self> {
        let tokens = DEFAULT_VENDOR_TOKENS.iter().map(|s| s.to_string()).collect();
        Self::build(source, tokens)
    }

    pub fn with_config(source: Box<dyn EntrySource>, config: &AppsConfig) -> Arc<Self> {
        Self::build(source, config.vendor_tokens.clone())
    }

    fn build(source: Box<dyn EntrySource>, vendor_tokens: Vec<String>) -> Arc<Self> {
        let (tx, _) = broadcast::channel(64);

        Arc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            source,
            vendor_tokens,
            registry: RwLock::new(Registry::default()),
            running: RwLock::new(HashMap::new()),
            proxy_provider: RwLock::new(None),
            event_tx: tx,
        })
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn weak(&self) -> Weak<AppSystem> {
        self.weak_self.clone()
    }

    /// Install the provider used for busy proxies of newly running apps.
    pub fn set_proxy_provider(&self, provider: Arc<dyn AppProxyProvider>) {
        *self
            .proxy_provider
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(provider);
    }

    pub fn proxy_provider(&self) -> Option<Arc<dyn AppProxyProvider>> {
        self.proxy_provider
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read the catalog from the entry source. On failure the previous
    /// catalog stays in place untouched.
    pub fn reload(&self) -> Result<(), CatalogError> {
        let entries = self
            .source
            .load_entries()
            .inspect_err(|e| warn!("Catalog reload failed, keeping previous catalog: {}", e))?;
        self.apply_entries(entries);
        Ok(())
    }

    /// Replace the catalog with `entries`. Records for ids that survive are
    /// updated in place.
    pub fn apply_entries(&self, entries: Vec<DesktopEntry>) {
        let roots = self.source.directories();
        let prefixes: HashSet<String> = entries
            .iter()
            .filter_map(|e| vendor_prefix_for_entry(e, &self.vendor_tokens, &roots))
            .collect();

        let visible = {
            let mut registry = self.write_registry();
            let mut next: HashMap<String, Arc<App>> = HashMap::with_capacity(entries.len());

            for entry in entries {
                let existing = next
                    .get(&entry.id)
                    .or_else(|| registry.apps.get(&entry.id))
                    .cloned();
                match existing {
                    Some(app) => {
                        app.set_entry(entry);
                        next.insert(app.id().to_string(), app);
                    }
                    None => {
                        let id = entry.id.clone();
                        next.insert(id, App::new_for_entry(entry, self.weak()));
                    }
                }
            }

            for id in registry.apps.keys().filter(|id| !next.contains_key(*id)) {
                debug!("App {} left the catalog", id);
            }

            registry.apps = next;
            registry.vendor_prefixes = prefixes;
            registry.rebuild_indexes();

            let mut visible: Vec<Arc<App>> = registry
                .apps
                .values()
                .filter(|app| !app.no_display())
                .cloned()
                .collect();
            visible.sort_by(|a, b| a.id().cmp(b.id()));
            info!(
                "App catalog loaded: {} apps, {} vendor prefixes",
                registry.apps.len(),
                registry.vendor_prefixes.len()
            );
            visible
        };

        deduplicate(&visible);

        let _ = self.event_tx.send(AppEvent::InstalledChanged);
    }

    /// Exact id lookup, falling back to a case-insensitive match.
    pub fn lookup_app(&self, id: &str) -> Option<Arc<App>> {
        let registry = self.read_registry();
        if let Some(app) = registry.apps.get(id) {
            return Some(app.clone());
        }

        registry
            .apps
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(id))
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, app)| app.clone())
    }

    /// Exact, case-sensitive id lookup.
    pub fn lookup_app_exact(&self, id: &str) -> Option<Arc<App>> {
        self.read_registry().apps.get(id).cloned()
    }

    /// Look up `name`, then `name` with each known vendor prefix prepended.
    pub fn lookup_heuristic_basename(&self, name: &str) -> Option<Arc<App>> {
        if let Some(app) = self.lookup_app(name) {
            return Some(app);
        }

        self.vendor_prefixes()
            .into_iter()
            .find_map(|prefix| self.lookup_app_exact(&format!("{}{}", prefix, name)))
    }

    pub fn lookup_startup_wmclass(&self, wm_class: &str) -> Option<Arc<App>> {
        let registry = self.read_registry();
        let id = registry.by_startup_wm_class.get(wm_class)?;
        registry.apps.get(id).cloned()
    }

    pub fn lookup_flatpak_app_id(&self, flatpak_id: &str) -> Option<Arc<App>> {
        let registry = self.read_registry();
        let id = registry.by_flatpak_id.get(flatpak_id)?;
        registry.apps.get(id).cloned()
    }

    /// Guess a desktop id from a raw window class ("Gnome-terminal" becomes
    /// "gnome-terminal.desktop") and look it up heuristically.
    pub fn lookup_desktop_wmclass(&self, wm_class: &str) -> Option<Arc<App>> {
        self.lookup_heuristic_basename(&desktop_id_for_wmclass(wm_class))
    }

    /// Installed applications that are neither no-display nor hidden duplicates, by id.
    pub fn installed(&self) -> Vec<Arc<App>> {
        let mut apps: Vec<Arc<App>> = self
            .read_registry()
            .apps
            .values()
            .filter(|app| !app.no_display() && !app.is_hidden_as_duplicate())
            .cloned()
            .collect();
        apps.sort_by(|a, b| a.id().cmp(b.id()));
        apps
    }

    /// Running applications, by id.
    pub fn running(&self) -> Vec<Arc<App>> {
        let mut apps: Vec<Arc<App>> = self
            .running
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        apps.sort_by(|a, b| a.id().cmp(b.id()));
        apps
    }

    pub fn vendor_prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.read_registry().vendor_prefixes.iter().cloned().collect();
        prefixes.sort();
        prefixes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.event_tx.subscribe()
    }

    /// Called by an app after its run state changed.
    pub(crate) fn notify_app_state_changed(&self, app: &Arc<App>) {
        let state = app.state();
        {
            let mut running = self.running.write().unwrap_or_else(PoisonError::into_inner);
            match state {
                AppState::Running => {
                    running.insert(app.id().to_string(), app.clone());
                }
                AppState::Starting => {}
                AppState::Stopped => {
                    running.remove(app.id());
                }
            }
        }

        let _ = self.event_tx.send(AppEvent::AppStateChanged {
            id: app.id().to_string(),
            state,
        });
    }
}

fn desktop_id_for_wmclass(wm_class: &str) -> String {
    let mut name = wm_class.to_lowercase();

    let sandboxed = name.ends_with(SANDBOX_SUFFIX);
    if sandboxed {
        name.truncate(name.len() - SANDBOX_SUFFIX.len());
    }

    for ext in [".py", ".sh"] {
        if let Some(stripped) = name.strip_suffix(ext) {
            name = stripped.to_string();
            break;
        }
    }

    let name = name.replace(' ', "-");
    if sandboxed {
        format!("{}.desktop{}", name, SANDBOX_SUFFIX)
    } else {
        format!("{}.desktop", name)
    }
}

/// Prefix implied by the directories between an entry's file and its
/// applications root, e.g. "kde4-" for "applications/kde4/kate.desktop".
fn vendor_prefix_for_entry(
    entry: &DesktopEntry,
    vendor_tokens: &[String],
    roots: &[PathBuf],
) -> Option<String> {
    let path = &entry.desktop_file_path;
    let file_name = path.file_name()?.to_string_lossy();
    let id = entry.id.strip_suffix(SANDBOX_SUFFIX).unwrap_or(&entry.id);

    if vendor_tokens.iter().any(|t| file_name.starts_with(t.as_str())) || file_name == id {
        return None;
    }

    let mut prefix = String::new();
    let mut dir = path.parent();
    while let Some(current) = dir {
        if is_catalog_root(current, roots) {
            break;
        }
        let Some(name) = current.file_name().map(|n| n.to_string_lossy()) else {
            break;
        };
        if id.contains(name.as_ref()) {
            prefix = format!("{}-{}", name, prefix);
        }
        dir = current.parent();
    }

    (!prefix.is_empty() && id.starts_with(&prefix)).then_some(prefix)
}

fn is_catalog_root(dir: &Path, roots: &[PathBuf]) -> bool {
    roots.iter().any(|root| root == dir)
        || dir.file_name().is_some_and(|name| name == "applications")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use capy_wm::{Window, WindowId, WindowProps};
    use std::sync::Mutex;

    /// Entry source whose snapshot can be swapped or made to fail.
    pub(crate) struct FakeSource {
        pub entries: Mutex<Result<Vec<DesktopEntry>, String>>,
    }

    impl FakeSource {
        pub(crate) fn new(entries: Vec<DesktopEntry>) -> Self {
            Self {
                entries: Mutex::new(Ok(entries)),
            }
        }
    }

    impl EntrySource for FakeSource {
        fn load_entries(&self) -> Result<Vec<DesktopEntry>, CatalogError> {
            match &*self.entries.lock().unwrap() {
                Ok(entries) => Ok(entries.clone()),
                Err(msg) => Err(CatalogError::Io(std::io::Error::other(msg.clone()))),
            }
        }
    }

    pub(crate) fn entry(id: &str, name: &str, exec: &str) -> DesktopEntry {
        DesktopEntry {
            id: id.to_string(),
            name: name.to_string(),
            exec: exec.to_string(),
            try_exec: None,
            icon_name: None,
            startup_wm_class: None,
            comment: None,
            no_display: false,
            flatpak_app_id: None,
            desktop_file_path: PathBuf::from(format!("/usr/share/applications/{}", id)),
        }
    }

    pub(crate) fn system_with(entries: Vec<DesktopEntry>) -> Arc<AppSystem> {
        let system = AppSystem::new(Box::new(FakeSource::new(Vec::new())));
        system.apply_entries(entries);
        system
    }

    #[test]
    fn test_lookup_exact_then_case_insensitive() {
        let system = system_with(vec![
            entry("Gedit.desktop", "Gedit", "gedit"),
            entry("org.gnome.Maps.desktop", "Maps", "gnome-maps"),
        ]);

        assert_eq!(system.lookup_app("Gedit.desktop").unwrap().id(), "Gedit.desktop");
        assert_eq!(system.lookup_app("gedit.desktop").unwrap().id(), "Gedit.desktop");
        assert!(system.lookup_app_exact("gedit.desktop").is_none());
        assert!(system.lookup_app("nope.desktop").is_none());
    }

    #[test]
    fn test_startup_wmclass_and_flatpak_index() {
        let mut chromium = entry("chromium.desktop", "Chromium", "chromium");
        chromium.startup_wm_class = Some("chromium".into());

        let mut maps = entry("org.gnome.Maps.desktop:flatpak", "Maps", "flatpak run org.gnome.Maps");
        maps.flatpak_app_id = Some("org.gnome.Maps".into());
        maps.startup_wm_class = Some("org.gnome.Maps".into());

        // Id does not match the declared flatpak id, so it is not indexed.
        let mut odd = entry("odd.desktop:flatpak", "Odd", "odd");
        odd.flatpak_app_id = Some("org.example.Odd".into());

        let system = system_with(vec![chromium, maps, odd]);

        assert_eq!(system.lookup_startup_wmclass("chromium").unwrap().id(), "chromium.desktop");
        assert!(system.lookup_startup_wmclass("Chromium").is_none());
        assert!(system.lookup_startup_wmclass("org.gnome.Maps").is_none());
        assert_eq!(
            system.lookup_startup_wmclass("org.gnome.Maps:flatpak").unwrap().id(),
            "org.gnome.Maps.desktop:flatpak"
        );
        assert_eq!(
            system.lookup_flatpak_app_id("org.gnome.Maps").unwrap().id(),
            "org.gnome.Maps.desktop:flatpak"
        );
        assert!(system.lookup_flatpak_app_id("org.example.Odd").is_none());
    }

    #[test]
    fn test_desktop_wmclass_normalization() {
        assert_eq!(desktop_id_for_wmclass("Gnome-terminal"), "gnome-terminal.desktop");
        assert_eq!(desktop_id_for_wmclass("Script.py"), "script.desktop");
        assert_eq!(desktop_id_for_wmclass("Run Me.sh"), "run-me.desktop");
        assert_eq!(
            desktop_id_for_wmclass("org.gnome.Maps:flatpak"),
            "org.gnome.maps.desktop:flatpak"
        );

        let mut maps = entry("org.gnome.Maps.desktop:flatpak", "Maps", "maps");
        maps.flatpak_app_id = Some("org.gnome.Maps".into());
        let system = system_with(vec![maps, entry("gnome-terminal.desktop", "Terminal", "gnome-terminal")]);

        assert_eq!(
            system.lookup_desktop_wmclass("Gnome-terminal").unwrap().id(),
            "gnome-terminal.desktop"
        );
        assert_eq!(
            system.lookup_desktop_wmclass("org.gnome.Maps:flatpak").unwrap().id(),
            "org.gnome.Maps.desktop:flatpak"
        );
        assert!(system.lookup_desktop_wmclass("org.gnome.Maps").is_none());
    }

    #[test]
    fn test_vendor_prefix_from_subdirectory() {
        let mut kate = entry("kde4-kate.desktop", "Kate", "kate");
        kate.desktop_file_path = PathBuf::from("/usr/share/applications/kde4/kate.desktop");
        let mut vendored = entry("kde4-gnome-thing.desktop", "Thing", "thing");
        vendored.desktop_file_path = PathBuf::from("/usr/share/applications/kde4/gnome-thing.desktop");

        let tokens: Vec<String> = DEFAULT_VENDOR_TOKENS.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            vendor_prefix_for_entry(&kate, &tokens, &[]).as_deref(),
            Some("kde4-")
        );
        assert!(vendor_prefix_for_entry(&vendored, &tokens, &[]).is_none());
        assert!(vendor_prefix_for_entry(&entry("gedit.desktop", "Gedit", "gedit"), &tokens, &[]).is_none());

        let system = system_with(vec![kate]);
        assert_eq!(system.vendor_prefixes(), vec!["kde4-".to_string()]);
        assert_eq!(
            system.lookup_heuristic_basename("kate.desktop").unwrap().id(),
            "kde4-kate.desktop"
        );
        assert_eq!(system.lookup_desktop_wmclass("Kate").unwrap().id(), "kde4-kate.desktop");
    }

    #[test]
    fn test_reload_preserves_identity_and_names() {
        let source = Arc::new(FakeSource::new(vec![
            entry("a.desktop", "Editor", "/usr/bin/edit"),
            entry("b.desktop", "Editor", "/usr/bin/edit2"),
        ]));

        struct Shared(Arc<FakeSource>);
        impl EntrySource for Shared {
            fn load_entries(&self) -> Result<Vec<DesktopEntry>, CatalogError> {
                self.0.load_entries()
            }
        }

        let system = AppSystem::new(Box::new(Shared(source.clone())));
        system.reload().unwrap();
        let a = system.lookup_app("a.desktop").unwrap();
        assert_eq!(a.name(), "Editor (Edit)");

        let window = Window::new(
            WindowId(1),
            WindowProps {
                wm_class: Some("Edit".into()),
                workspace: Some(1),
                ..Default::default()
            },
        );
        a.add_window(&window);
        assert_eq!(system.running().len(), 1);

        system.reload().unwrap();
        let a_again = system.lookup_app("a.desktop").unwrap();
        assert!(Arc::ptr_eq(&a, &a_again));
        assert_eq!(a_again.name(), "Editor (Edit)");
        assert_eq!(a_again.n_windows(), 1);
        assert!(a_again.has_window(WindowId(1)));
        assert_eq!(a_again.state(), AppState::Running);
        assert!(Arc::ptr_eq(&system.running()[0], &a));

        // A failing reload keeps the previous catalog.
        *source.entries.lock().unwrap() = Err("disk on fire".into());
        assert!(system.reload().is_err());
        assert_eq!(system.installed().len(), 2);

        // Absent ids are dropped.
        *source.entries.lock().unwrap() = Ok(vec![entry("a.desktop", "Editor", "/usr/bin/edit")]);
        system.reload().unwrap();
        assert!(system.lookup_app("b.desktop").is_none());
        assert!(Arc::ptr_eq(&a, &system.lookup_app("a.desktop").unwrap()));
    }

    #[test]
    fn test_reload_emits_installed_changed() {
        let system = system_with(Vec::new());
        let mut rx = system.subscribe();
        system.apply_entries(vec![entry("gedit.desktop", "Gedit", "gedit")]);
        assert_eq!(rx.try_recv().unwrap(), AppEvent::InstalledChanged);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_installed_excludes_no_display_and_hidden() {
        let mut hidden = entry("settings-daemon.desktop", "Daemon", "daemon");
        hidden.no_display = true;
        let system = system_with(vec![
            hidden,
            entry("a.desktop", "Editor", "/usr/bin/edit"),
            entry("b.desktop", "Editor", "/usr/bin/edit"),
        ]);

        let ids: Vec<String> = system.installed().iter().map(|a| a.id().to_string()).collect();
        assert_eq!(ids, vec!["a.desktop".to_string()]);
        assert!(system.lookup_app("settings-daemon.desktop").is_some());
        assert!(system.lookup_app("b.desktop").unwrap().is_hidden_as_duplicate());
    }
}
