//! # branchmesh-replica: replicated ledger replicas
//!
//! A replica holds one copy of a shared account balance and keeps its peers
//! in step by synchronously broadcasting every write to all of them.
//!
//! ## Architecture
//!
//! ```text
//!            client surface                     peer surface
//!   Query / Deposit / Withdraw       PropagateDeposit / PropagateWithdraw
//!                 │                                  │
//!                 ▼                                  ▼
//!          ┌─────────────────────────────────────────────┐
//!          │               ReplicaServer                  │
//!          │     (one listener, one task per connection)  │
//!          └──────────────────────┬──────────────────────┘
//!                                 ▼
//!          ┌─────────────────────────────────────────────┐
//!          │  LedgerReplica ──broadcast──► PeerTransport  │
//!          │                               (ConnectionPool)│
//!          └─────────────────────────────────────────────┘
//! ```
//!
//! Addresses of all replicas come from a static [`ReplicaRegistry`] built
//! before any server starts.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use branchmesh_replica::{ConnectionPool, LedgerReplica, ReplicaRegistry, ReplicaServer};
//!
//! let server = ReplicaServer::bind("127.0.0.1:0".parse()?).await?;
//! let registry = Arc::new(ReplicaRegistry::from_addresses([(id, server.local_addr())])?);
//! let replica = LedgerReplica::new(id, 100, registry.peers_of(id), ConnectionPool::new(registry));
//! let mut handle = server.serve(Arc::new(replica));
//! handle.stop().await?;
//! ```

mod connection;
mod error;
mod handler;
mod ledger;
mod pool;
mod registry;
mod server;

pub use error::{
    PeerError, RegistryError, RegistryResult, ReplicaError, ReplicaResult, RpcError, RpcResult,
    ServerError, ServerResult,
};
pub use handler::RequestHandler;
pub use ledger::{LedgerReplica, PeerTransport};
pub use pool::ConnectionPool;
pub use registry::ReplicaRegistry;
pub use server::{ReplicaHandle, ReplicaServer};
