//! Loopback TCP server for observer connections.
//!
//! Listens on a loopback address and creates an
//! [`ObserverConn`](super::ObserverConn) for each
//! accepted connection. Decoded control lines go to a [`CommandHandler`].

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::observers::ObserverSet;
use super::ObserverId;
use crate::constants::ACCEPT_RETRY_DELAY;
use crate::protocol::ControlMessage;

/// Receives every decoded control line, tagged with the sending connection.
///
/// Called from connection read tasks; implementations must not block.
pub trait CommandHandler: Send + Sync {
    /// Apply one decoded line from `observer`.
    fn handle(&self, observer: &ObserverId, message: ControlMessage);
}

/// Loopback TCP server for the control channel.
///
/// Binds a `TcpListener` and spawns an accept loop that registers an
/// [`ObserverConn`](super::ObserverConn) in the [`ObserverSet`] for each
/// connection.
#[derive(Debug)]
pub struct SessionServer {
    /// Address actually bound (resolves port 0).
    local_addr: SocketAddr,
    /// Handle to the accept loop task.
    accept_handle: JoinHandle<()>,
}

impl SessionServer {
    /// Bind `addr` and start accepting on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns an error if `addr` is not loopback or cannot be bound.
    pub fn start(
        runtime: &Handle,
        addr: SocketAddr,
        observers: Arc<ObserverSet>,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Self> {
        if !addr.ip().is_loopback() {
            bail!("Control channel must bind a loopback address, got {addr}");
        }

        let listener = std::net::TcpListener::bind(addr)
            .with_context(|| format!("Failed to bind control channel: {addr}"))?;
        let local_addr = listener.local_addr()?;

        // Convert std listener to tokio async listener
        listener.set_nonblocking(true)?;
        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(listener)?
        };

        log::info!("[Session] Control channel listening on {local_addr}");

        let accept_handle = runtime.spawn(Self::accept_loop(listener, observers, handler));

        Ok(Self {
            local_addr,
            accept_handle,
        })
    }

    /// Accept loop - runs as a tokio task.
    async fn accept_loop(
        listener: TcpListener,
        observers: Arc<ObserverSet>,
        handler: Arc<dyn CommandHandler>,
    ) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let id = ObserverId::generate();
                    log::info!("[Session] Observer connected: {id} ({peer})");
                    if let Err(e) = stream.set_nodelay(true) {
                        log::debug!("[Session] set_nodelay failed for {id}: {e}");
                    }

                    observers.accept(id, stream, Arc::clone(&handler));
                }
                Err(e) => {
                    log::error!("[Session] Accept error: {e}");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections. Existing connections are closed by
    /// [`ObserverSet::close_all`].
    pub fn shutdown(self) {
        self.accept_handle.abort();
        log::info!("[Session] Control channel on {} stopped", self.local_addr);
    }
}
