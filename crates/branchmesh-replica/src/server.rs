//! TCP server exposing a replica's client and peer surfaces.
//!
//! Both surfaces share one listener. Every accepted connection runs on its
//! own task and handles requests sequentially; concurrency comes from
//! callers opening several connections.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      ReplicaServer                        │
//! │  ┌────────────┐   ┌──────────────┐   ┌────────────────┐  │
//! │  │  Listener  │ → │  Connection  │ → │ RequestHandler │  │
//! │  │  (accept)  │   │  (JoinSet)   │   │ (→ LedgerReplica) │
//! │  └────────────┘   └──────────────┘   └────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Shutdown is graceful: the accept loop stops, idle connections close, and
//! requests already being handled run to completion before the listener is
//! released.

use std::net::SocketAddr;
use std::sync::Arc;

use branchmesh_types::ReplicaId;
use branchmesh_wire::{ErrorCode, Request, RequestId, Response, WireError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::error::{RpcError, ServerError, ServerResult};
use crate::handler::RequestHandler;
use crate::ledger::{LedgerReplica, PeerTransport};

/// A bound, not yet serving, replica listener.
pub struct ReplicaServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ReplicaServer {
    /// Binds the listener. Port 0 picks an ephemeral port.
    pub async fn bind(addr: SocketAddr) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::BindFailed { addr, source })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts serving `replica` on a background task.
    pub fn serve<T: PeerTransport>(self, replica: Arc<LedgerReplica<T>>) -> ReplicaHandle<T> {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handler = RequestHandler::new(Arc::clone(&replica));
        let id = replica.id();

        info!(replica_id = %id, addr = %self.local_addr, "replica listening");
        let task = tokio::spawn(accept_loop(id, self.listener, handler, shutdown_rx));

        ReplicaHandle {
            replica,
            addr: self.local_addr,
            shutdown,
            task: Some(task),
        }
    }
}

/// Handle to a running replica server.
///
/// Dropping the handle signals shutdown without waiting for it; call
/// [`stop`](Self::stop) to wait for in-flight requests to finish.
pub struct ReplicaHandle<T> {
    replica: Arc<LedgerReplica<T>>,
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl<T: PeerTransport> ReplicaHandle<T> {
    pub fn id(&self) -> ReplicaId {
        self.replica.id()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Current balance of the served replica.
    pub fn balance(&self) -> i64 {
        self.replica.balance()
    }

    pub fn replica(&self) -> &Arc<LedgerReplica<T>> {
        &self.replica
    }

    /// Returns true until [`stop`](Self::stop) has completed.
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Stops accepting connections and waits for in-flight requests.
    ///
    /// Calling `stop` on a stopped server is a no-op.
    pub async fn stop(&mut self) -> ServerResult<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        self.shutdown.send_replace(true);
        task.await
            .map_err(|err| ServerError::Task(err.to_string()))?;

        info!(replica_id = %self.id(), balance = self.balance(), "replica stopped");
        Ok(())
    }
}

impl<T> Drop for ReplicaHandle<T> {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn accept_loop<T: PeerTransport>(
    id: ReplicaId,
    listener: TcpListener,
    handler: RequestHandler<T>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            () = shutdown_requested(&mut shutdown) => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    debug!(replica_id = %id, %peer_addr, "accepted connection");
                    connections.spawn(serve_connection(
                        id,
                        stream,
                        peer_addr,
                        handler.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    error!(replica_id = %id, "accept error: {e}");
                }
            },

            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    warn!(replica_id = %id, "connection task failed: {e}");
                }
            }
        }
    }

    debug!(replica_id = %id, open = connections.len(), "draining connections");
    while let Some(finished) = connections.join_next().await {
        if let Err(e) = finished {
            warn!(replica_id = %id, "connection task failed: {e}");
        }
    }

    drop(listener);
}

async fn serve_connection<T: PeerTransport>(
    id: ReplicaId,
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: RequestHandler<T>,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(replica_id = %id, %peer_addr, "set_nodelay failed: {e}");
    }
    let mut connection = Connection::new(stream);

    loop {
        // Shutdown is only observed between requests, so a request that has
        // been read is always answered.
        let frame = tokio::select! {
            () = shutdown_requested(&mut shutdown) => break,
            frame = connection.read_frame() => frame,
        };

        let response = match frame {
            Ok(Some(frame)) => match Request::from_frame(&frame) {
                Ok(request) => handler.handle(request).await,
                Err(e) => {
                    warn!(replica_id = %id, %peer_addr, "malformed request: {e}");
                    Response::error(RequestId(0), ErrorCode::InvalidRequest, e.to_string())
                }
            },
            Ok(None) => {
                debug!(replica_id = %id, %peer_addr, "connection closed by peer");
                break;
            }
            Err(RpcError::Wire(WireError::UnsupportedVersion(version))) => {
                warn!(replica_id = %id, %peer_addr, version, "unsupported protocol version");
                let response = Response::error(
                    RequestId(0),
                    ErrorCode::UnsupportedVersion,
                    format!("unsupported protocol version {version}"),
                );
                // The stream cannot be resynchronized, so close after replying.
                let _ = write_response(&mut connection, &response).await;
                break;
            }
            Err(e) => {
                debug!(replica_id = %id, %peer_addr, "read error: {e}");
                break;
            }
        };

        if let Err(e) = write_response(&mut connection, &response).await {
            debug!(replica_id = %id, %peer_addr, "write error: {e}");
            break;
        }
    }
}

/// Resolves once shutdown has been signalled or the handle is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|&stop| stop).await;
}

async fn write_response(connection: &mut Connection, response: &Response) -> Result<(), RpcError> {
    connection.write_frame(&response.to_frame()?).await
}
