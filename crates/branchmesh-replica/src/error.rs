//! Error types for replicas, the registry and the RPC transport.

use std::net::SocketAddr;

use branchmesh_types::ReplicaId;
use branchmesh_wire::{ErrorCode, WireError};
use thiserror::Error;

/// Result type for ledger operations.
pub type ReplicaResult<T> = Result<T, ReplicaError>;

/// Result type for registry lookups.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for RPC calls.
pub type RpcResult<T> = Result<T, RpcError>;

/// Result type for server lifecycle operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Failure of a client- or peer-facing ledger operation.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// The local balance does not cover the amount.
    #[error("insufficient funds: balance {balance}, requested {amount}")]
    InsufficientFunds { balance: i64, amount: i64 },

    /// Amounts must be strictly positive.
    #[error("invalid amount: {0} (must be > 0)")]
    InvalidAmount(i64),

    /// The balance cannot represent the result of applying `amount`.
    #[error("balance overflow: balance {balance}, amount {amount}")]
    BalanceOverflow { balance: i64, amount: i64 },

    /// A peer could not be reached during broadcast.
    #[error("replica {peer} unavailable: {reason}")]
    RemoteUnavailable { peer: ReplicaId, reason: String },

    /// A peer refused the propagated write.
    #[error("replica {peer} rejected propagation: {code}: {message}")]
    PeerRejected {
        peer: ReplicaId,
        code: ErrorCode,
        message: String,
    },
}

impl ReplicaError {
    pub(crate) fn from_peer(peer: ReplicaId, err: PeerError) -> Self {
        match err {
            PeerError::Unavailable(reason) => Self::RemoteUnavailable { peer, reason },
            PeerError::Rejected { code, message } => Self::PeerRejected {
                peer,
                code,
                message,
            },
        }
    }

    /// The wire code reported to the caller for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            Self::InvalidAmount(_) => ErrorCode::InvalidAmount,
            Self::BalanceOverflow { .. } => ErrorCode::BalanceOverflow,
            Self::RemoteUnavailable { .. } => ErrorCode::RemoteUnavailable,
            Self::PeerRejected { .. } => ErrorCode::PeerRejected,
        }
    }
}

/// Failure of a single propagation call, as seen by the broadcaster.
#[derive(Debug, Clone, Error)]
pub enum PeerError {
    /// Transport-level failure.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The peer answered with an error.
    #[error("{code}: {message}")]
    Rejected { code: ErrorCode, message: String },
}

/// Registry construction and lookup errors.
///
/// All of these are configuration errors: they surface at startup and abort
/// the run.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No replica with this identity is registered.
    #[error("replica {0} is not in the registry")]
    UnknownReplica(ReplicaId),

    /// The same identity was registered twice.
    #[error("replica {0} registered more than once")]
    DuplicateReplica(ReplicaId),

    /// The registry holds no replicas.
    #[error("registry is empty")]
    Empty,

    /// `base_port + id` does not fit in a port number.
    #[error("port overflow: base port {base_port} + replica {id} exceeds 65535")]
    PortOverflow { base_port: u16, id: ReplicaId },
}

/// Errors raised by the RPC client.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Target identity could not be resolved.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Could not open a connection to the target.
    #[error("failed to connect to replica {replica} at {addr}: {source}")]
    Connect {
        replica: ReplicaId,
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// I/O error on an established connection.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire protocol error.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    /// The remote end closed the connection mid-call.
    #[error("connection closed")]
    ConnectionClosed,

    /// The response did not match the request.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The replica answered with an error.
    #[error("{code}: {message}")]
    Remote {
        code: ErrorCode,
        message: String,
        balance: Option<i64>,
    },
}

impl RpcError {
    /// Returns true if the call failed because the target was unreachable
    /// (as opposed to the target answering with an error).
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, Self::Remote { .. } | Self::Registry(_))
    }

    /// The remote error code, if the target answered with an error.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Balance reported alongside a remote error, if any.
    pub fn balance(&self) -> Option<i64> {
        match self {
            Self::Remote { balance, .. } => *balance,
            _ => None,
        }
    }
}

impl From<RpcError> for PeerError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Remote { code, message, .. } => PeerError::Rejected { code, message },
            other => PeerError::Unavailable(other.to_string()),
        }
    }
}

/// Replica server lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Bind failed.
    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The serving task panicked or was aborted.
    #[error("server task failed: {0}")]
    Task(String),
}
