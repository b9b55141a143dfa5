//! RPC client with per-replica connection reuse.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use branchmesh_types::{Operation, PropagationMessage, ReplicaId};
use branchmesh_wire::{Request, RequestId, RequestPayload, ResponsePayload};
use tokio::net::TcpStream;
use tracing::debug;

use crate::connection::Connection;
use crate::error::{PeerError, RpcError, RpcResult};
use crate::ledger::PeerTransport;
use crate::registry::ReplicaRegistry;

/// Connection pool keyed by replica identity.
///
/// Each call checks out an idle connection to the target (or opens one),
/// performs a single request/response exchange on it, and returns it to the
/// pool. Concurrent calls to the same replica use separate connections.
/// Connections that fail mid-call are discarded, never retried.
///
/// The pool's lifetime is tied to its owner: the cluster driver owns one for
/// client sessions and every replica owns one for its peers.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    registry: Arc<ReplicaRegistry>,
    idle: Mutex<HashMap<ReplicaId, Vec<Connection>>>,
    next_request_id: AtomicU64,
}

impl ConnectionPool {
    pub fn new(registry: Arc<ReplicaRegistry>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                registry,
                idle: Mutex::new(HashMap::new()),
                next_request_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn registry(&self) -> &ReplicaRegistry {
        &self.inner.registry
    }

    /// Number of idle connections currently pooled.
    pub fn idle_connections(&self) -> usize {
        self.lock_idle().values().map(Vec::len).sum()
    }

    /// Sends a request to `target` and returns the raw response payload.
    pub async fn call(
        &self,
        target: ReplicaId,
        payload: impl Into<RequestPayload>,
    ) -> RpcResult<ResponsePayload> {
        let mut connection = match self.checkout(target) {
            Some(connection) => connection,
            None => self.connect(target).await?,
        };

        let id = RequestId(self.inner.next_request_id.fetch_add(1, Ordering::Relaxed));
        let response = connection.round_trip(&Request::new(id, payload)).await?;

        self.checkin(target, connection);
        Ok(response.payload)
    }

    /// Invokes a client-surface operation and returns the reported balance.
    ///
    /// An error answer from the replica becomes [`RpcError::Remote`].
    pub async fn invoke(&self, target: ReplicaId, operation: Operation) -> RpcResult<i64> {
        match self.call(target, operation).await? {
            ResponsePayload::Balance(response) => Ok(response.balance),
            ResponsePayload::Error(err) => Err(RpcError::Remote {
                code: err.code,
                message: err.message,
                balance: err.balance,
            }),
            ResponsePayload::Ack(_) => Err(RpcError::UnexpectedResponse(
                "ack returned for a client operation".to_string(),
            )),
        }
    }

    /// Sends a propagation message to a peer and waits for its ack.
    pub async fn propagate_to(&self, peer: ReplicaId, message: PropagationMessage) -> RpcResult<()> {
        match self.call(peer, message).await? {
            ResponsePayload::Ack(_) => Ok(()),
            ResponsePayload::Error(err) => Err(RpcError::Remote {
                code: err.code,
                message: err.message,
                balance: err.balance,
            }),
            ResponsePayload::Balance(_) => Err(RpcError::UnexpectedResponse(
                "balance returned for a propagation".to_string(),
            )),
        }
    }

    async fn connect(&self, target: ReplicaId) -> RpcResult<Connection> {
        let addr = self.inner.registry.resolve(target)?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| RpcError::Connect {
                replica: target,
                addr,
                source,
            })?;
        stream.set_nodelay(true)?;

        debug!(replica_id = %target, %addr, "opened connection");
        Ok(Connection::new(stream))
    }

    fn checkout(&self, target: ReplicaId) -> Option<Connection> {
        self.lock_idle().get_mut(&target).and_then(Vec::pop)
    }

    fn checkin(&self, target: ReplicaId, connection: Connection) {
        self.lock_idle().entry(target).or_default().push(connection);
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, HashMap<ReplicaId, Vec<Connection>>> {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl PeerTransport for ConnectionPool {
    async fn propagate(&self, peer: ReplicaId, message: PropagationMessage) -> Result<(), PeerError> {
        self.propagate_to(peer, message)
            .await
            .map_err(PeerError::from)
    }
}
