//! zbus implementation of the application proxy.
//!
//! - Build a proxy for the destination
//! - Read the `Busy` property once
//! - Listen to its change stream and forward the fresh value

use crate::error::BusError;
use crate::types::{AppProxyFuture, AppProxyProvider};
use futures_util::{Stream, StreamExt};
use log::{debug, warn};
use tokio::sync::watch;
use zbus::Connection;

/// D-Bus proxy for the GApplication interface
#[zbus::proxy(interface = "org.gtk.Application", default_path = "/org/gtk/Application")]
trait GtkApplication {
    #[zbus(property)]
    fn busy(&self) -> zbus::Result<bool>;
}

/// Provider backed by a shared session bus connection.
#[derive(Clone)]
pub struct GtkAppProxyProvider {
    connection: Connection,
}

impl GtkAppProxyProvider {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Connect to the session bus.
    pub async fn session() -> Result<Self, BusError> {
        Ok(Self::new(Connection::session().await?))
    }
}

impl AppProxyProvider for GtkAppProxyProvider {
    fn app_proxy(&self, bus_name: &str, object_path: &str) -> AppProxyFuture {
        let connection = self.connection.clone();
        let bus_name = bus_name.to_string();
        let object_path = object_path.to_string();

        Box::pin(async move {
            if bus_name.is_empty() {
                return Err(BusError::NoBusIdentity);
            }

            let proxy = GtkApplicationProxy::builder(&connection)
                .destination(bus_name.clone())?
                .path(object_path)?
                .build()
                .await?;

            let busy_stream = proxy.receive_busy_changed().await;
            let initial = match proxy.busy().await {
                Ok(busy) => busy,
                Err(e) => {
                    debug!("Busy property unavailable on {}: {}", bus_name, e);
                    false
                }
            };
            let (tx, rx) = watch::channel(initial);

            let changes = busy_stream.then(|change| async move { change.get().await });
            tokio::spawn(forward_busy(changes, tx, bus_name));

            Ok(rx)
        })
    }
}

/// Push busy changes into `tx` until every receiver is gone or the peer
/// drops off the bus.
async fn forward_busy<S>(changes: S, tx: watch::Sender<bool>, bus_name: String)
where
    S: Stream<Item = zbus::Result<bool>>,
{
    let mut changes = std::pin::pin!(changes);
    loop {
        tokio::select! {
            change = changes.next() => match change {
                Some(Ok(busy)) => {
                    if tx.send(busy).is_err() {
                        break;
                    }
                }
                Some(Err(e)) => warn!("Failed to read busy state from {}: {}", bus_name, e),
                None => break,
            },
            _ = tx.closed() => {
                debug!("Busy watch for {} dropped", bus_name);
                break;
            }
        }
    }
}
