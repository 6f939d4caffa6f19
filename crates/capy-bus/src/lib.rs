//! capy-bus - Session bus plumbing for the app tracker
//!
//! Features:
//! - Asynchronous `org.gtk.Application` busy proxy behind a provider trait
//! - Busy state delivered as a watch channel (latest value wins)
//! - Action muxer describing the remote `app.` and `win.` action groups

pub mod actions;
pub mod client;
pub mod error;
pub mod types;

pub use actions::{ActionGroupRef, ActionMuxer};
pub use client::GtkAppProxyProvider;
pub use error::BusError;
pub use types::{AppProxyFuture, AppProxyProvider, BusyWatch};
