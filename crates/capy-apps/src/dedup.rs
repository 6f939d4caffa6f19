//! Display name deduplication.
//!
//! Applications sharing a display name get a distinguishing unique name:
//! flatpaks are tagged "(Flatpak)", others get their executable appended.
//! Entries running the very same program are hidden as duplicates.

use crate::app::App;
use log::debug;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Rename or hide colliding apps. `apps` should exclude no-display records.
///
/// Duplicate markings from an earlier pass are re-evaluated, so an entry that
/// stopped running the same program as another becomes visible again.
pub fn deduplicate(apps: &[Arc<App>]) {
    let mut groups: BTreeMap<String, Vec<Arc<App>>> = BTreeMap::new();
    let mut released = HashSet::new();
    for app in apps {
        if app.release_duplicate() {
            released.insert(app.id().to_string());
        }
        groups.entry(app.common_name()).or_default().push(app.clone());
    }

    for (name, mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        group.sort_by(|a, b| a.id().cmp(b.id()));
        let had_duplicates = group.iter().any(|app| released.contains(app.id()));
        deduplicate_group(&name, &group, had_duplicates);
    }
}

fn deduplicate_group(name: &str, group: &[Arc<App>], had_duplicates: bool) {
    for app in group {
        if app.is_sandboxed() && app.unique_name().is_none() {
            app.set_unique_name(format!("{} (Flatpak)", name));
        }
    }

    if !has_collision(group) && !had_duplicates {
        return;
    }

    for app in group {
        if app.unique_name().is_some() {
            continue;
        }

        let unique = match app.executable_basename() {
            Some(exec) => {
                let exec = capitalize(&exec);
                if exec == name {
                    name.to_string()
                } else {
                    format!("{} ({})", name, exec)
                }
            }
            None => name.to_string(),
        };

        let kept = app.executable().and_then(|executable| {
            group.iter().find(|other| {
                !Arc::ptr_eq(other, app)
                    && !other.is_hidden_as_duplicate()
                    && other.unique_name().as_deref() == Some(unique.as_str())
                    && other.executable().as_deref() == Some(executable.as_str())
            })
        });
        if let Some(kept) = kept {
            debug!("Hiding {} as a duplicate of {}", app.id(), kept.id());
            app.set_hidden_as_duplicate(true);
        }
        app.set_unique_name(unique);
    }
}

fn has_collision(group: &[Arc<App>]) -> bool {
    let mut seen = HashSet::new();
    group
        .iter()
        .filter(|app| !app.is_hidden_as_duplicate())
        .any(|app| !seen.insert(app.name()))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
