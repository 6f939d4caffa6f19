//! Capability aggregation over remote action groups.
//!
//! A GTK client exports one action group for the application and one per
//! window. The muxer records where each lives under its namespace prefix so
//! menus can address `app.quit` or `win.close` without knowing the bus layout.

use serde::{Deserialize, Serialize};

/// Namespace for application-wide actions.
pub const APP_PREFIX: &str = "app";
/// Namespace for per-window actions.
pub const WIN_PREFIX: &str = "win";

/// Location of one exported action group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionGroupRef {
    pub prefix: String,
    pub bus_name: String,
    pub object_path: String,
}

/// Combined view of the `app` and `win` action groups of one application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMuxer {
    groups: Vec<ActionGroupRef>,
}

impl ActionMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the group registered under `prefix`.
    pub fn insert(&mut self, prefix: &str, bus_name: &str, object_path: &str) {
        let group = ActionGroupRef {
            prefix: prefix.to_string(),
            bus_name: bus_name.to_string(),
            object_path: object_path.to_string(),
        };
        match self.groups.iter_mut().find(|g| g.prefix == prefix) {
            Some(existing) => *existing = group,
            None => self.groups.push(group),
        }
    }

    pub fn get(&self, prefix: &str) -> Option<&ActionGroupRef> {
        self.groups.iter().find(|g| g.prefix == prefix)
    }

    /// Resolve a detailed action name ("win.close") to its group and bare name.
    pub fn lookup_action<'a>(&self, action: &'a str) -> Option<(&ActionGroupRef, &'a str)> {
        let (prefix, name) = action.split_once('.')?;
        self.get(prefix).map(|group| (group, name))
    }

    pub fn groups(&self) -> &[ActionGroupRef] {
        &self.groups
    }
}
