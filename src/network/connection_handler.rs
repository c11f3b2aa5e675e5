//! Per-connection lifecycle: one accepted client socket paired with one
//! upstream socket, relayed in both directions until both finish.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::data_capture::{stream_tee, Direction};
use crate::session_management::Session;

/// Upstream destination every connection is relayed to.
#[derive(Debug, Clone)]
pub struct UpstreamAddr {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Handles one client connection end to end. This function is total: every
/// failure is mapped to a log line and absorbed here, so a single hostile or
/// broken connection can never take down the accept loop or its siblings.
///
/// If the upstream connect fails the connection is aborted with no capture
/// files created; otherwise both direction pumps run concurrently and the
/// handler waits for both to reach a terminal state. Sockets are closed on
/// drop when the handler returns.
pub async fn handle(
    client: TcpStream,
    connection_id: u64,
    peer_addr: SocketAddr,
    session: Arc<Session>,
    upstream: UpstreamAddr,
    mut cancel: watch::Receiver<bool>,
) {
    info!("New connection #{} from {}", connection_id, peer_addr);

    if *cancel.borrow() {
        debug!("Connection #{}: cancelled before upstream connect", connection_id);
        return;
    }

    let upstream_stream = tokio::select! {
        _ = cancel.changed() => {
            debug!("Connection #{}: cancelled before upstream connect", connection_id);
            return;
        }
        connect = TcpStream::connect((upstream.host.as_str(), upstream.port)) => match connect {
            Ok(stream) => stream,
            Err(e) => {
                error!(
                    "Connection #{}: failed to connect to upstream {}: {}",
                    connection_id, upstream, e
                );
                return;
            }
        },
    };

    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream_stream.into_split();

    let mut directions = JoinSet::new();
    {
        let log_path = session.log_path(connection_id, Direction::ClientToUpstream);
        let cancel = cancel.clone();
        directions.spawn(async move {
            let result = stream_tee::relay(
                client_read,
                upstream_write,
                log_path,
                connection_id,
                Direction::ClientToUpstream,
                cancel,
            )
            .await;
            (Direction::ClientToUpstream, result)
        });
    }
    {
        let log_path = session.log_path(connection_id, Direction::UpstreamToClient);
        let cancel = cancel.clone();
        directions.spawn(async move {
            let result = stream_tee::relay(
                upstream_read,
                client_write,
                log_path,
                connection_id,
                Direction::UpstreamToClient,
                cancel,
            )
            .await;
            (Direction::UpstreamToClient, result)
        });
    }

    // Both directions must reach a terminal state before the connection is
    // considered closed.
    while let Some(joined) = directions.join_next().await {
        match joined {
            Ok((direction, Ok(outcome))) => {
                debug!(
                    "Connection #{}: {} finished: {:?}",
                    connection_id, direction, outcome
                );
            }
            Ok((direction, Err(e))) => {
                error!("Connection #{}: {} ended with {}", connection_id, direction, e);
            }
            Err(e) => {
                error!("Connection #{}: relay task failed: {}", connection_id, e);
            }
        }
    }

    info!("Closing connection #{}", connection_id);
}
