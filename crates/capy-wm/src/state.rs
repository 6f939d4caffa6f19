//! Window manager state cache.

use crate::types::{GroupId, StartupSequence, WindowHandle, WindowId, WmEvent};
use log::debug;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Cached view of the window manager, updated from [`WmEvent`]s.
pub struct WmState {
    windows: RwLock<HashMap<WindowId, WindowHandle>>,
    focus_window: RwLock<Option<WindowId>>,
    active_workspace: RwLock<i32>,
    startup_sequences: RwLock<Vec<StartupSequence>>,
}

impl Default for WmState {
    fn default() -> Self {
        Self::new()
    }
}

impl WmState {
    pub fn new() -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            focus_window: RwLock::new(None),
            active_workspace: RwLock::new(1),
            startup_sequences: RwLock::new(Vec::new()),
        }
    }

    /// Fold an event into the cache.
    pub fn apply(&self, event: &WmEvent) {
        match event {
            WmEvent::WindowCreated(window) => {
                self.sync_workspace_flag(window);
                self.windows
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(window.id(), window.clone());
            }
            WmEvent::WindowRemoved(id) => {
                self.windows
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(id);
                let mut focus = self
                    .focus_window
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                if *focus == Some(*id) {
                    *focus = None;
                }
            }
            WmEvent::WindowChanged(id) | WmEvent::WindowClassChanged(id) => {
                if let Some(window) = self.window(*id) {
                    self.sync_workspace_flag(&window);
                }
            }
            WmEvent::FocusChanged(id) => {
                *self
                    .focus_window
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = *id;
            }
            WmEvent::WorkspaceSwitched(workspace) => {
                debug!("Active workspace is now {}", workspace);
                *self
                    .active_workspace
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = *workspace;
                for window in self.windows() {
                    self.sync_workspace_flag(&window);
                }
            }
            WmEvent::StartupSequenceChanged(sequence) => {
                let mut sequences = self
                    .startup_sequences
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                match sequences.iter_mut().find(|s| s.id == sequence.id) {
                    Some(existing) => *existing = sequence.clone(),
                    None => sequences.push(sequence.clone()),
                }
            }
            WmEvent::StartupSequenceRemoved(id) => {
                self.startup_sequences
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|s| &s.id != id);
            }
        }
    }

    fn sync_workspace_flag(&self, window: &WindowHandle) {
        let active = self.active_workspace();
        window.update(|props| {
            props.on_active_workspace = props.workspace.is_none_or(|ws| ws == active);
        });
    }

    pub fn window(&self, id: WindowId) -> Option<WindowHandle> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// All managed windows, ordered by stable sequence.
    pub fn windows(&self) -> Vec<WindowHandle> {
        let mut windows: Vec<WindowHandle> = self
            .windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        windows.sort_by_key(|w| w.stable_sequence());
        windows
    }

    pub fn focus_window(&self) -> Option<WindowHandle> {
        let id = (*self
            .focus_window
            .read()
            .unwrap_or_else(PoisonError::into_inner))?;
        self.window(id)
    }

    pub fn active_workspace(&self) -> i32 {
        *self
            .active_workspace
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn startup_sequences(&self) -> Vec<StartupSequence> {
        self.startup_sequences
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Windows belonging to a window group.
    pub fn group_members(&self, group: GroupId) -> Vec<WindowHandle> {
        self.windows()
            .into_iter()
            .filter(|w| w.group() == Some(group))
            .collect()
    }

    /// Follow transient-for links up to the topmost ancestor.
    pub fn transient_root(&self, window: &WindowHandle) -> WindowHandle {
        let mut current = window.clone();
        // Bounded so a broken transient cycle cannot hang us.
        for _ in 0..32 {
            match current.transient_for().and_then(|id| self.window(id)) {
                Some(parent) if parent.id() != current.id() => current = parent,
                _ => break,
            }
        }
        current
    }
}
