//! Desktop entry parsing.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to ids and window classes of flatpak-sandboxed apps.
pub const SANDBOX_SUFFIX: &str = ":flatpak";

/// parsed from .desktop files.
#[derive(Clone, Debug, PartialEq)]
pub struct DesktopEntry {
    /// Desktop file id, e.g. "firefox.desktop" or "org.gnome.Maps.desktop:flatpak".
    pub id: String,
    pub name: String,
    pub exec: String,
    pub try_exec: Option<String>,
    pub icon_name: Option<String>,
    pub startup_wm_class: Option<String>,
    pub comment: Option<String>,
    pub no_display: bool,
    /// Flatpak application id from `X-Flatpak`, set only for sandboxed apps.
    pub flatpak_app_id: Option<String>,
    pub desktop_file_path: PathBuf,
}

impl DesktopEntry {
    pub fn is_sandboxed(&self) -> bool {
        self.flatpak_app_id.is_some()
    }

    /// Program that gets executed: `TryExec` if present, else the first `Exec` token.
    pub fn executable(&self) -> Option<String> {
        if let Some(try_exec) = &self.try_exec {
            return Some(try_exec.clone());
        }
        first_exec_token(&self.exec)
    }

    /// File name of [`Self::executable`].
    pub fn executable_basename(&self) -> Option<String> {
        let exec = self.executable()?;
        Path::new(&exec)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
    }

    /// Key used in the startup window-class index. Sandboxed entries carry
    /// the sandbox suffix so they only match sandboxed windows.
    pub fn startup_wm_class_key(&self) -> Option<String> {
        let wm_class = self.startup_wm_class.as_ref()?;
        if self.is_sandboxed() {
            Some(format!("{}{}", wm_class, SANDBOX_SUFFIX))
        } else {
            Some(wm_class.clone())
        }
    }
}

fn first_exec_token(exec: &str) -> Option<String> {
    let exec = exec.trim_start();
    let token = if let Some(rest) = exec.strip_prefix('"') {
        rest.split('"').next()?
    } else {
        exec.split_whitespace().next()?
    };
    (!token.is_empty()).then(|| token.to_string())
}

/// Parse a .desktop file into a DesktopEntry struct.
pub fn parse_desktop_file(path: &Path, id: &str) -> Option<DesktopEntry> {
    let content = fs::read_to_string(path).ok()?;
    parse_desktop_entry(&content, id, path)
}

/// Parse desktop entry text. Returns `None` for anything that is not an
/// undeleted `Application` entry with a name and a command.
pub fn parse_desktop_entry(content: &str, id: &str, path: &Path) -> Option<DesktopEntry> {
    let mut entries = HashMap::new();
    let mut in_desktop_entry = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            in_desktop_entry = line == "[Desktop Entry]";
            continue;
        }

        if in_desktop_entry {
            if let Some((key, value)) = line.split_once('=') {
                entries.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    if entries.get("Type").map(|s| s.as_str()) != Some("Application") {
        return None;
    }

    // Hidden=true marks a deleted entry.
    if flag(&entries, "Hidden") {
        return None;
    }

    let name = entries.get("Name")?.clone();
    let exec = entries.get("Exec")?.clone();

    Some(DesktopEntry {
        id: id.to_string(),
        name,
        exec,
        try_exec: non_empty(&entries, "TryExec"),
        icon_name: non_empty(&entries, "Icon"),
        startup_wm_class: non_empty(&entries, "StartupWMClass"),
        comment: non_empty(&entries, "Comment"),
        no_display: flag(&entries, "NoDisplay"),
        flatpak_app_id: non_empty(&entries, "X-Flatpak"),
        desktop_file_path: path.to_path_buf(),
    })
}

fn flag(entries: &HashMap<String, String>, key: &str) -> bool {
    entries.get(key).map(|s| s == "true").unwrap_or(false)
}

fn non_empty(entries: &HashMap<String, String>, key: &str) -> Option<String> {
    entries.get(key).filter(|v| !v.is_empty()).cloned()
}
