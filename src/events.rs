//! Control thread event channel.
//!
//! Background threads (WM listener, catalog watcher) publish here; the main
//! loop drains and processes everything in arrival order.

use capy_wm::WmEvent;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::OnceLock;

/// Everything the control thread reacts to.
#[derive(Clone, Debug)]
pub enum ShellEvent {
    /// Some application directory changed on disk.
    CatalogChanged,
    Wm(WmEvent),
}

static CHANNEL: OnceLock<(Sender<ShellEvent>, Receiver<ShellEvent>)> = OnceLock::new();

fn channel() -> &'static (Sender<ShellEvent>, Receiver<ShellEvent>) {
    CHANNEL.get_or_init(unbounded)
}

/// Send an event to the control thread. Non-blocking.
#[inline]
pub fn send(event: ShellEvent) {
    let _ = channel().0.send(event);
}

pub fn receiver() -> Receiver<ShellEvent> {
    channel().1.clone()
}

/// Collect `first` plus whatever is already queued. Catalog changes arrive
/// in bursts, so only the first of them is kept; WM events keep their order.
pub fn drain_burst(first: ShellEvent, rx: &Receiver<ShellEvent>) -> Vec<ShellEvent> {
    let mut events = vec![first];
    events.extend(rx.try_iter());

    let mut catalog_seen = false;
    events.retain(|event| match event {
        ShellEvent::CatalogChanged => !std::mem::replace(&mut catalog_seen, true),
        ShellEvent::Wm(_) => true,
    });
    events
}
