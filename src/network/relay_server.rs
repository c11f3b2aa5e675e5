//! The accept loop and the shutdown orchestrator.
//!
//! [`RelayServer`] binds the incoming port and dispatches every accepted
//! connection to [`connection_handler::handle`] as an independent task in a
//! supervised [`JoinSet`], so the accept loop never waits on a connection.
//! Shutdown is two-phase: raise the process-wide cancellation signal, wait a
//! short grace interval so in-flight reads and writes can unwind, then close
//! the listener and drain the outstanding handlers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::configuration::Config;
use crate::error_handling::types::NetworkError;
use crate::network::connection_handler::{self, UpstreamAddr};
use crate::session_management::Session;

/// Grace interval between raising cancellation and closing the listener.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

pub struct RelayServer {
    listener: TcpListener,
    session: Arc<Session>,
    upstream: UpstreamAddr,
}

impl RelayServer {
    /// Binds the incoming port. A bind failure is fatal for the process, so
    /// it propagates as a startup error.
    pub async fn bind(config: &Config, session: Arc<Session>) -> Result<Self, NetworkError> {
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], config.incoming_port));
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            error!("Failed to bind {}: {}", bind_addr, e);
            NetworkError::BindError(e)
        })?;

        info!(
            "Listening on port {}, relaying to {}:{}",
            config.incoming_port, config.outgoing_host, config.outgoing_port
        );

        Ok(Self {
            listener,
            session,
            upstream: UpstreamAddr {
                host: config.outgoing_host.clone(),
                port: config.outgoing_port,
            },
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.listener.local_addr().map_err(NetworkError::SockError)
    }

    /// Spawns the accept loop and returns the handle used to stop it.
    pub fn start(self) -> RelayHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            self.listener,
            self.session,
            self.upstream,
            cancel_rx,
            stop_rx,
        ));

        RelayHandle {
            cancel_tx,
            stop_tx,
            task,
        }
    }
}

/// Handle on a running relay, owning the two shutdown signals.
pub struct RelayHandle {
    cancel_tx: watch::Sender<bool>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Two-phase shutdown. Phase 1: raise the cancellation signal observed
    /// by every active read/write and wait out the grace interval. Phase 2:
    /// stop the accept loop (which closes the listener) and wait for it to
    /// drain the remaining connection tasks.
    pub async fn shutdown(self) {
        info!("Shutting down, draining active connections");
        let _ = self.cancel_tx.send(true);
        tokio::time::sleep(SHUTDOWN_GRACE).await;

        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Accept loop task failed during shutdown: {}", e);
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    session: Arc<Session>,
    upstream: UpstreamAddr,
    cancel_rx: watch::Receiver<bool>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut handlers = JoinSet::new();
    // Incremented here, in the accept task, so ids are serialized with
    // accepts: strictly increasing within the session, never reused.
    let mut connection_id: u64 = 0;

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((client, peer_addr)) => {
                    connection_id += 1;
                    handlers.spawn(connection_handler::handle(
                        client,
                        connection_id,
                        peer_addr,
                        Arc::clone(&session),
                        upstream.clone(),
                        cancel_rx.clone(),
                    ));
                    // Keep the set bounded by the number of live connections.
                    reap_finished(&mut handlers);
                }
                Err(e) => {
                    error!("Failed to accept a connection: {}", e);
                    // Avoid a hot spin on persistent accept failures.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
        }
    }

    // Stop admitting connections before waiting out the stragglers.
    drop(listener);
    while let Some(joined) = handlers.join_next().await {
        if let Err(e) = joined {
            error!("Connection task failed: {}", e);
        }
    }
    info!("Accept loop stopped after {} connection(s)", connection_id);
}

/// Collects entries for connection tasks that already finished, so the set
/// only ever holds live connections. Returns how many entries were
/// collected.
fn reap_finished(handlers: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = handlers.try_join_next() {
        if let Err(e) = joined {
            error!("Connection task failed: {}", e);
        }
        reaped += 1;
    }
    reaped
}
