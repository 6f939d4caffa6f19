//! Desktop entry sources feeding the app system.

use crate::config::AppsConfig;
use crate::desktop_entry::{DesktopEntry, SANDBOX_SUFFIX, parse_desktop_file};
use crate::error::CatalogError;
use crate::paths::get_application_directories;
use log::debug;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Provider of the flattened desktop entry catalog.
pub trait EntrySource: Send + Sync {
    /// Load a complete snapshot. Either every directory is read or an error
    /// is returned; individual broken files are skipped.
    fn load_entries(&self) -> Result<Vec<DesktopEntry>, CatalogError>;

    /// Directories worth watching for changes.
    fn directories(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Scans XDG application directories (plus flatpak and snap exports).
pub struct XdgEntrySource {
    dirs: Vec<PathBuf>,
}

impl XdgEntrySource {
    pub fn new(config: &AppsConfig) -> Self {
        let mut dirs = config.extra_application_dirs.clone();
        dirs.extend(get_application_directories());
        Self::with_directories(dirs)
    }

    /// Scan exactly these directories, highest precedence first.
    pub fn with_directories(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

/// Desktop file id of `path` below the applications directory `root`:
/// "kde4/kate.desktop" becomes "kde4-kate.desktop".
pub fn desktop_file_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    (!parts.is_empty()).then(|| parts.join("-"))
}

impl EntrySource for XdgEntrySource {
    fn load_entries(&self) -> Result<Vec<DesktopEntry>, CatalogError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for dir in &self.dirs {
            if !dir.exists() {
                continue;
            }

            let walker = walkdir::WalkDir::new(dir).follow_links(true).sort_by_file_name();
            for item in walker {
                let item = match item {
                    Ok(item) => item,
                    Err(e) if e.depth() == 0 => {
                        return Err(CatalogError::Directory {
                            path: dir.clone(),
                            source: e,
                        });
                    }
                    Err(e) => {
                        debug!("Skipping unreadable catalog path: {}", e);
                        continue;
                    }
                };

                let path = item.path();
                if !item.file_type().is_file()
                    || path.extension().and_then(|e| e.to_str()) != Some("desktop")
                {
                    continue;
                }

                let Some(id) = desktop_file_id(dir, path) else {
                    continue;
                };

                // Earlier directories shadow later ones.
                if !seen.insert(id.clone()) {
                    continue;
                }

                let Some(mut entry) = parse_desktop_file(path, &id) else {
                    debug!("Skipping desktop file {}", path.display());
                    continue;
                };

                if entry.is_sandboxed() {
                    entry.id = format!("{}{}", id, SANDBOX_SUFFIX);
                }
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    fn directories(&self) -> Vec<PathBuf> {
        self.dirs.iter().filter(|d| d.exists()).cloned().collect()
    }
}
