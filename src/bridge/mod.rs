//! This module contains the network-facing bridge: a TCP listener that hands
//! each accepted connection to a bounded pool of workers.
pub mod connection;
pub mod protocol;

use connection::{Connection, ConnectionContext};
pub use protocol::ProtocolError;

use crate::service::{LoggingService, ServiceError};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// The default port clients connect to.
pub const DEFAULT_PORT: u16 = 25334;
/// The default number of connections served in parallel.
pub const DEFAULT_WORKERS: usize = 10;
/// The default upper bound on a single request line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Why a single request could not be served.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Tunables of the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Connections served in parallel. Further connections wait for a slot.
    pub workers: usize,
    /// Longest accepted request line, terminator excluded.
    pub max_line_bytes: usize,
    /// Whether `getAllLogs`, `getLogsFor` and `clearLogs` are answered.
    pub expose_queries: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            expose_queries: false,
        }
    }
}

/// A bound, not yet running bridge.
pub struct Bridge {
    listener: TcpListener,
    service: Arc<dyn LoggingService>,
    config: BridgeConfig,
}

impl Bridge {
    /// Binds the listening socket.
    ///
    /// # Arguments
    ///
    /// * `addr` - The address to listen on.
    /// * `service` - The endpoint requests are dispatched to.
    /// * `config` - Pool size and protocol limits.
    ///
    /// # Errors
    ///
    /// This function will return an error if the address cannot be bound.
    pub async fn bind<A>(
        addr: A,
        service: Arc<dyn LoggingService>,
        config: BridgeConfig,
    ) -> Result<Self>
    where
        A: ToSocketAddrs + std::fmt::Debug,
    {
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind bridge listener on {:?}", addr))?;

        Ok(Self {
            listener,
            service,
            config,
        })
    }

    /// Returns the address the bridge is listening on.
    ///
    /// # Errors
    ///
    /// This function will return an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` turns `true` or its sender is
    /// dropped.
    ///
    /// Once shut down the listener is closed immediately, while connections
    /// already accepted are served until their clients disconnect. This
    /// function returns after the last of them has finished.
    ///
    /// # Errors
    ///
    /// This function currently never fails after a successful bind; accept
    /// errors are logged and retried.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let Bridge {
            listener,
            service,
            config,
        } = self;

        let workers = Arc::new(Semaphore::new(config.workers.max(1)));
        let ctx = Arc::new(ConnectionContext {
            service,
            max_line_bytes: config.max_line_bytes,
            expose_queries: config.expose_queries,
        });
        let mut connections = JoinSet::new();
        let mut next_id: u64 = 0;

        if let Ok(addr) = listener.local_addr() {
            info!("Bridge listening on {} with {} workers", addr, config.workers.max(1));
        }

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        next_id += 1;
                        let id = next_id;
                        info!("Client connected: {} (connection {})", peer, id);

                        if workers.available_permits() == 0 {
                            debug!("All workers busy, connection {} queued", id);
                        }

                        let workers = workers.clone();
                        let ctx = ctx.clone();
                        connections.spawn(async move {
                            let Ok(_permit) = workers.acquire_owned().await else {
                                return;
                            };
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!("Connection {}: cannot set TCP_NODELAY: {}", id, e);
                            }
                            Connection::new(id, peer, stream).run(&ctx).await;
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        warn!("Connection worker ended abnormally: {}", e);
                    }
                }
            }
        }

        drop(listener);
        info!(
            "Bridge stopped accepting, waiting for {} connection(s) to finish",
            connections.len()
        );

        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                warn!("Connection worker ended abnormally: {}", e);
            }
        }

        info!("Bridge stopped");
        Ok(())
    }
}
