//! Error types for capy-bus

/// Session bus errors
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("D-Bus error: {0}")]
    DBus(#[from] zbus::Error),

    #[error("D-Bus fdo error: {0}")]
    Fdo(#[from] zbus::fdo::Error),

    #[error("Application has no bus identity")]
    NoBusIdentity,
}
