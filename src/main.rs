//! capy-tracker - Application tracking daemon for Hyprland
//!
//! Matches every window to the application it belongs to and follows run
//! state and focus. All tracking runs on the main thread; background
//! threads only publish events.

mod events;
mod services;

use capy_apps::{AppsConfig, TrackerEvent, WindowTracker};
use events::ShellEvent;
use log::info;
use std::error::Error;
use tokio::sync::broadcast::error::TryRecvError;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting capy-tracker...");

    let config = AppsConfig::load(&capy_apps::get_config_path());

    // Busy proxies run here; tracking itself never awaits.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("capy-bus")
        .enable_all()
        .build()?;
    let _guard = runtime.enter();

    let system = capy_apps::get_app_system();
    info!("{} applications installed", system.installed().len());

    let tracker = WindowTracker::new(system.clone(), capy_wm::get_state());
    let mut tracker_rx = tracker.subscribe();

    let _services = services::start_all(&system, &config, &runtime);
    tracker.track_existing_windows();

    let rx = events::receiver();
    for first in rx.iter() {
        for event in events::drain_burst(first, &rx) {
            match event {
                ShellEvent::CatalogChanged => {
                    // Failures are logged and keep the previous catalog.
                    let _ = system.reload();
                }
                ShellEvent::Wm(event) => tracker.handle_event(&event),
            }
        }

        loop {
            match tracker_rx.try_recv() {
                Ok(TrackerEvent::FocusAppChanged(id)) => {
                    info!("Focused app: {}", id.as_deref().unwrap_or("none"));
                }
                Ok(TrackerEvent::TrackedWindowsChanged) => {}
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }

    Ok(())
}
