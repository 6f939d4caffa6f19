//! Core types for capy-bus

use crate::error::BusError;
use futures_util::future::BoxFuture;
use tokio::sync::watch;

/// Latest busy state of a remote application; `changed()` fires on updates.
pub type BusyWatch = watch::Receiver<bool>;

/// Future returned by [`AppProxyProvider::app_proxy`].
pub type AppProxyFuture = BoxFuture<'static, Result<BusyWatch, BusError>>;

/// Source of per-application proxies.
///
/// Implementations must not block: the returned future is polled on the
/// ambient tokio runtime and may be dropped (cancelled) at any point.
pub trait AppProxyProvider: Send + Sync {
    /// Connect to the application exported at `object_path` by `bus_name`.
    fn app_proxy(&self, bus_name: &str, object_path: &str) -> AppProxyFuture;
}
