//! Window to application matching.
//!
//! Each heuristic looks at one kind of evidence. They run in a fixed order
//! and the first one that decides wins.

use crate::app::App;
use crate::app_system::AppSystem;
use crate::desktop_entry::SANDBOX_SUFFIX;
use crate::sandbox::SandboxInfoReader;
use capy_wm::{StartupSequence, WindowHandle, WindowId, WindowType, WmState};
use log::debug;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Everything a heuristic may consult.
pub struct ResolveContext<'a> {
    pub system: &'a AppSystem,
    pub wm: &'a WmState,
    pub sandbox: &'a dyn SandboxInfoReader,
    pub window_to_app: &'a HashMap<WindowId, Arc<App>>,
    pub launched_pid_to_app: &'a HashMap<i32, Arc<App>>,
}

/// Outcome of a single heuristic.
#[derive(Debug)]
pub enum Step {
    Found(Arc<App>),
    /// No opinion, try the next heuristic.
    Next,
    /// Stop here; the window gets an app of its own.
    WindowBacked,
}

type Heuristic = fn(&ResolveContext<'_>, &WindowHandle) -> Step;

const HEURISTICS: &[(&str, Heuristic)] = &[
    ("known window", known_window),
    ("remote window", remote_window),
    ("sandboxed app", sandboxed_app),
    ("declared app id", declared_app_id),
    ("startup wm class", startup_wm_class),
    ("desktop wm class", desktop_wm_class),
    ("browser spawned window", browser_spawned_window),
    ("process id", process_id),
    ("startup notification", startup_notification),
    ("window group", window_group),
];

/// Find the app owning `window`. `None` means it needs a window-backed app.
pub fn resolve(ctx: &ResolveContext<'_>, window: &WindowHandle) -> Option<Arc<App>> {
    for (name, heuristic) in HEURISTICS {
        match heuristic(ctx, window) {
            Step::Found(app) => {
                debug!("Window {} matched {} by {}", window.id(), app.id(), name);
                return Some(app);
            }
            Step::WindowBacked => {
                debug!("Window {} is window-backed by {}", window.id(), name);
                return None;
            }
            Step::Next => {}
        }
    }
    None
}

fn found(app: Option<Arc<App>>) -> Step {
    app.map_or(Step::Next, Step::Found)
}

pub fn known_window(ctx: &ResolveContext<'_>, window: &WindowHandle) -> Step {
    found(ctx.window_to_app.get(&window.id()).cloned())
}

pub fn remote_window(_ctx: &ResolveContext<'_>, window: &WindowHandle) -> Step {
    if window.is_remote() {
        Step::WindowBacked
    } else {
        Step::Next
    }
}

/// Sandboxed clients are matched against sandboxed entries only.
pub fn sandboxed_app(ctx: &ResolveContext<'_>, window: &WindowHandle) -> Step {
    let Some(info) = ctx.sandbox.read(window.pid()) else {
        return Step::Next;
    };

    let suffixed: Vec<String> = [window.wm_class_instance(), window.wm_class()]
        .into_iter()
        .flatten()
        .map(|class| format!("{}{}", class, SANDBOX_SUFFIX))
        .collect();

    let app = suffixed
        .iter()
        .find_map(|class| ctx.system.lookup_startup_wmclass(class))
        .or_else(|| {
            suffixed
                .iter()
                .find_map(|class| ctx.system.lookup_desktop_wmclass(class))
        })
        .or_else(|| {
            info.app_name
                .as_deref()
                .and_then(|name| ctx.system.lookup_flatpak_app_id(name))
        });

    found(app)
}

pub fn declared_app_id(ctx: &ResolveContext<'_>, window: &WindowHandle) -> Step {
    let Some(app_id) = window.app_id() else {
        return Step::Next;
    };
    found(ctx.system.lookup_app_exact(&format!("{}.desktop", app_id)))
}

pub fn startup_wm_class(ctx: &ResolveContext<'_>, window: &WindowHandle) -> Step {
    found(
        [window.wm_class_instance(), window.wm_class()]
            .into_iter()
            .flatten()
            .find_map(|class| ctx.system.lookup_startup_wmclass(&class)),
    )
}

pub fn desktop_wm_class(ctx: &ResolveContext<'_>, window: &WindowHandle) -> Step {
    found(
        [window.wm_class_instance(), window.wm_class()]
            .into_iter()
            .flatten()
            .find_map(|class| ctx.system.lookup_desktop_wmclass(&class)),
    )
}

/// Windows a browser opens for web apps carry the page in the instance and
/// should keep their own identity instead of the browser's.
pub fn browser_spawned_window(_ctx: &ResolveContext<'_>, window: &WindowHandle) -> Step {
    let (Some(instance), Some(class)) = (window.wm_class_instance(), window.wm_class()) else {
        return Step::Next;
    };

    if instance == class || instance.eq_ignore_ascii_case(&class) {
        return Step::Next;
    }

    let mentions_browser = |s: &str| s.to_lowercase().contains("browser");
    if mentions_browser(&instance) || mentions_browser(&class) {
        Step::WindowBacked
    } else {
        Step::Next
    }
}

/// Processes the shell launched itself come first, then windows of
/// already-running apps.
pub fn process_id(ctx: &ResolveContext<'_>, window: &WindowHandle) -> Step {
    let pid = window.pid();
    if window.is_remote() || pid < 1 {
        return Step::Next;
    }

    if let Some(app) = ctx.launched_pid_to_app.get(&pid) {
        return Step::Found(app.clone());
    }

    found(
        ctx.system
            .running()
            .into_iter()
            .find(|app| app.pids().contains(&pid)),
    )
}

pub fn startup_notification(ctx: &ResolveContext<'_>, window: &WindowHandle) -> Step {
    let Some(startup_id) = window.startup_id() else {
        return Step::Next;
    };

    found(
        ctx.wm
            .startup_sequences()
            .iter()
            .find(|seq| seq.id == startup_id)
            .and_then(|seq| app_for_startup_sequence(ctx.system, seq)),
    )
}

pub fn window_group(ctx: &ResolveContext<'_>, window: &WindowHandle) -> Step {
    let Some(group) = window.group() else {
        return Step::Next;
    };

    found(
        ctx.wm
            .group_members(group)
            .iter()
            .filter(|member| member.id() != window.id())
            .filter(|member| member.window_type() == WindowType::Normal)
            .find_map(|member| ctx.window_to_app.get(&member.id()).cloned()),
    )
}

/// App named by a startup sequence's application id, which may be a desktop
/// file path or a bare desktop id.
pub fn app_for_startup_sequence(system: &AppSystem, sequence: &StartupSequence) -> Option<Arc<App>> {
    let application_id = sequence.application_id.as_deref()?;
    let basename = Path::new(application_id).file_name()?.to_string_lossy();
    system.lookup_app(&basename)
}
