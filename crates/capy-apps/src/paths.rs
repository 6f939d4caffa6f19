//! Path helpers for XDG directories and config files.

use std::path::PathBuf;

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default()
}

/// Get all application .desktop file directories, highest precedence first.
pub fn get_application_directories() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let home = home_dir();
    let xdg_data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home.join(".local/share"));
    let xdg_data_dirs = std::env::var("XDG_DATA_DIRS")
        .unwrap_or_else(|_| "/usr/local/share:/usr/share".to_string());

    dirs.push(xdg_data_home.join("applications"));

    for data_dir in xdg_data_dirs.split(':') {
        if !data_dir.is_empty() {
            dirs.push(PathBuf::from(data_dir).join("applications"));
        }
    }

    dirs.push(home.join(".local/share/flatpak/exports/share/applications"));
    dirs.push(PathBuf::from("/var/lib/flatpak/exports/share/applications"));
    dirs.push(PathBuf::from("/var/lib/snapd/desktop/applications"));

    dedup_preserving_order(dirs)
}

fn dedup_preserving_order(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::with_capacity(dirs.len());
    for dir in dirs {
        if !result.contains(&dir) {
            result.push(dir);
        }
    }
    result
}

/// Get the config file path.
/// Config is typically stored in ~/.config/CapyShell/apps.json
pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| home_dir().join(".config"))
        .join("CapyShell")
        .join("apps.json")
}

/// Location of the flatpak metadata file as seen from outside a sandbox.
pub fn get_flatpak_info_path(pid: i32) -> PathBuf {
    PathBuf::from(format!("/proc/{}/root/.flatpak-info", pid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let dirs = vec![
            PathBuf::from("/usr/share/applications"),
            PathBuf::from("/usr/local/share/applications"),
            PathBuf::from("/usr/share/applications"),
        ];
        assert_eq!(
            dedup_preserving_order(dirs),
            vec![
                PathBuf::from("/usr/share/applications"),
                PathBuf::from("/usr/local/share/applications"),
            ]
        );
    }

    #[test]
    fn test_flatpak_info_path() {
        assert_eq!(
            get_flatpak_info_path(4242),
            PathBuf::from("/proc/4242/root/.flatpak-info")
        );
    }
}
