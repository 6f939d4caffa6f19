//! User configuration for the app tracker.

use crate::error::CatalogError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Filename prefixes that mark a desktop file as already vendor-qualified.
pub const DEFAULT_VENDOR_TOKENS: &[&str] = &["gnome-", "fedora-", "mozilla-", "debian-"];

/// Settings for catalog scanning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppsConfig {
    /// Extra application directories, scanned before the XDG ones.
    pub extra_application_dirs: Vec<PathBuf>,
    /// Reload the catalog when application directories change.
    pub watch_catalog: bool,
    /// Filename prefixes that suppress vendor prefix derivation.
    pub vendor_tokens: Vec<String>,
}

impl Default for AppsConfig {
    fn default() -> Self {
        Self {
            extra_application_dirs: Vec::new(),
            watch_catalog: true,
            vendor_tokens: DEFAULT_VENDOR_TOKENS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AppsConfig {
    /// Load from config file, or return default if missing or malformed.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(config) => config,
            Err(CatalogError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!("Ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save to config file
    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = AppsConfig::load(Path::new("/nonexistent/capy/apps.json"));
        assert_eq!(config, AppsConfig::default());
        assert!(config.watch_catalog);
        assert_eq!(config.vendor_tokens.len(), DEFAULT_VENDOR_TOKENS.len());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AppsConfig =
            serde_json::from_str(r#"{ "watch_catalog": false }"#).unwrap();
        assert!(!config.watch_catalog);
        assert!(config.extra_application_dirs.is_empty());
        assert_eq!(config.vendor_tokens[0], "gnome-");
    }

    #[test]
    fn test_malformed_file_is_an_error_but_loads_defaults() {
        let dir = std::env::temp_dir().join(format!("capy-apps-badconfig-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("apps.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(AppsConfig::try_load(&path), Err(CatalogError::Config(_))));
        assert_eq!(AppsConfig::load(&path), AppsConfig::default());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("capy-apps-config-{}", std::process::id()))
            .join("apps.json");
        let config = AppsConfig {
            extra_application_dirs: vec![PathBuf::from("/opt/apps")],
            watch_catalog: false,
            vendor_tokens: vec!["acme-".into()],
        };

        config.save(&path).unwrap();
        assert_eq!(AppsConfig::load(&path), config);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
