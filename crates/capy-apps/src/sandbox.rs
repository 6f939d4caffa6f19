//! Flatpak sandbox metadata.

use crate::paths::get_flatpak_info_path;
use std::fs;

/// What the tracker needs from a sandbox metadata file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SandboxInfo {
    /// `name` from the `[Application]` group.
    pub app_name: Option<String>,
}

/// Reads sandbox metadata for a client process.
pub trait SandboxInfoReader: Send + Sync {
    /// `None` when the process is not sandboxed (no metadata file).
    fn read(&self, pid: i32) -> Option<SandboxInfo>;
}

/// Reads `/.flatpak-info` through `/proc/<pid>/root`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatpakInfoReader;

impl SandboxInfoReader for FlatpakInfoReader {
    fn read(&self, pid: i32) -> Option<SandboxInfo> {
        if pid < 1 {
            return None;
        }
        let content = fs::read_to_string(get_flatpak_info_path(pid)).ok()?;
        Some(parse_flatpak_info(&content))
    }
}

/// Parse the keyfile format of `.flatpak-info`.
pub fn parse_flatpak_info(content: &str) -> SandboxInfo {
    let mut in_application = false;
    let mut info = SandboxInfo::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_application = line == "[Application]";
            continue;
        }
        if in_application {
            if let Some((key, value)) = line.split_once('=') {
                if key.trim() == "name" && !value.trim().is_empty() {
                    info.app_name = Some(value.trim().to_string());
                }
            }
        }
    }

    info
}
