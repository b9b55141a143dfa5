//! Session error types.

use branchmesh_replica::RpcError;
use branchmesh_types::{CustomerId, ReplicaId};
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Failure of a single session event.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The call to the target replica failed or was rejected.
    #[error("customer {customer} event on replica {replica} failed: {source}")]
    Call {
        customer: CustomerId,
        replica: ReplicaId,
        #[source]
        source: RpcError,
    },
}

impl SessionError {
    /// Balance carried by the failure, if the replica reported one.
    pub fn balance(&self) -> Option<i64> {
        match self {
            Self::Call { source, .. } => source.balance(),
        }
    }
}
