//! Request handler that routes requests to the ledger replica.

use std::sync::Arc;

use branchmesh_wire::{Request, RequestPayload, Response};
use tracing::instrument;

use crate::error::ReplicaError;
use crate::ledger::{LedgerReplica, PeerTransport};

/// Routes decoded requests from either surface to a [`LedgerReplica`].
pub struct RequestHandler<T> {
    replica: Arc<LedgerReplica<T>>,
}

impl<T> Clone for RequestHandler<T> {
    fn clone(&self) -> Self {
        Self {
            replica: Arc::clone(&self.replica),
        }
    }
}

impl<T: PeerTransport> RequestHandler<T> {
    pub fn new(replica: Arc<LedgerReplica<T>>) -> Self {
        Self { replica }
    }

    /// Handles a request and returns a response.
    #[instrument(
        skip_all,
        fields(
            replica_id = %self.replica.id(),
            request_id = %request.id,
            surface = %request.payload.surface(),
            op = request.payload.name(),
        )
    )]
    pub async fn handle(&self, request: Request) -> Response {
        let id = request.id;
        let replica = &self.replica;

        let result = match request.payload {
            RequestPayload::Query => Ok(Response::balance(id, replica.query())),
            RequestPayload::Deposit { amount } => replica
                .deposit(amount)
                .await
                .map(|balance| Response::balance(id, balance)),
            RequestPayload::Withdraw { amount } => replica
                .withdraw(amount)
                .await
                .map(|balance| Response::balance(id, balance)),
            RequestPayload::PropagateDeposit { origin, amount } => replica
                .propagate_deposit(origin, amount)
                .map(|()| Response::ack(id)),
            RequestPayload::PropagateWithdraw { origin, amount } => replica
                .propagate_withdraw(origin, amount)
                .map(|()| Response::ack(id)),
        };

        result.unwrap_or_else(|err| error_to_wire(id, &err))
    }
}

fn error_to_wire(id: branchmesh_wire::RequestId, err: &ReplicaError) -> Response {
    let balance = match err {
        ReplicaError::InsufficientFunds { balance, .. } => Some(*balance),
        _ => None,
    };
    Response::error_with_balance(id, err.code(), err.to_string(), balance)
}

#[cfg(test)]
mod tests {
    use branchmesh_types::{PropagationMessage, ReplicaId};
    use branchmesh_wire::{ErrorCode, RequestId, ResponsePayload};

    use super::*;
    use crate::error::PeerError;

    #[derive(Clone)]
    struct Unreachable;

    impl PeerTransport for Unreachable {
        async fn propagate(&self, _: ReplicaId, _: PropagationMessage) -> Result<(), PeerError> {
            Err(PeerError::Unavailable("connection refused".into()))
        }
    }

    fn handler(balance: i64, peers: Vec<ReplicaId>) -> RequestHandler<Unreachable> {
        RequestHandler::new(Arc::new(LedgerReplica::new(
            ReplicaId::new(0),
            balance,
            peers,
            Unreachable,
        )))
    }

    #[tokio::test]
    async fn insufficient_withdraw_reports_balance() {
        let handler = handler(20, Vec::new());
        let response = handler
            .handle(Request::new(
                RequestId(4),
                RequestPayload::Withdraw { amount: 50 },
            ))
            .await;

        assert_eq!(response.id, RequestId(4));
        match response.payload {
            ResponsePayload::Error(err) => {
                assert_eq!(err.code, ErrorCode::InsufficientFunds);
                assert_eq!(err.balance, Some(20));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn peer_operations_answer_with_ack() {
        let handler = handler(20, Vec::new());
        let response = handler
            .handle(Request::new(
                RequestId(1),
                RequestPayload::PropagateDeposit {
                    origin: ReplicaId::new(2),
                    amount: 5,
                },
            ))
            .await;
        assert!(matches!(response.payload, ResponsePayload::Ack(ack) if ack.success));

        let response = handler
            .handle(Request::new(RequestId(2), RequestPayload::Query))
            .await;
        assert!(matches!(
            response.payload,
            ResponsePayload::Balance(b) if b.balance == 25 && b.success
        ));
    }

    #[tokio::test]
    async fn overflowing_deposit_is_answered_with_its_code() {
        let handler = handler(i64::MAX - 1, Vec::new());
        let response = handler
            .handle(Request::new(RequestId(5), RequestPayload::Deposit { amount: 2 }))
            .await;

        assert!(matches!(
            response.payload,
            ResponsePayload::Error(ref err)
                if err.code == ErrorCode::BalanceOverflow && err.balance.is_none()
        ));
    }

    #[tokio::test]
    async fn unreachable_peer_fails_deposit() {
        let handler = handler(20, vec![ReplicaId::new(1)]);
        let response = handler
            .handle(Request::new(RequestId(3), RequestPayload::Deposit { amount: 5 }))
            .await;

        assert!(matches!(
            response.payload,
            ResponsePayload::Error(ref err) if err.code == ErrorCode::RemoteUnavailable
        ));
    }
}
