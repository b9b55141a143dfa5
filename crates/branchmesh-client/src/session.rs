//! Customer session: runs an event list against replicas one event at a time.

use std::future::Future;

use branchmesh_replica::{ConnectionPool, RpcResult};
use branchmesh_types::{CustomerId, Operation, ReplicaId};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{SessionError, SessionResult};
use crate::trace::{SessionRecord, TraceEntry};

/// Issues client-surface operations to replicas by identity.
///
/// [`ConnectionPool`] is the production implementation.
pub trait ReplicaClient: Send + Sync {
    /// Runs `operation` on `target` and returns the balance it reports.
    fn invoke(
        &self,
        target: ReplicaId,
        operation: Operation,
    ) -> impl Future<Output = RpcResult<i64>> + Send;
}

impl ReplicaClient for ConnectionPool {
    async fn invoke(&self, target: ReplicaId, operation: Operation) -> RpcResult<i64> {
        ConnectionPool::invoke(self, target, operation).await
    }
}

/// One event of a customer's list, resolved to its target replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub target: ReplicaId,
    pub operation: Operation,
}

impl SessionEvent {
    pub fn new(target: ReplicaId, operation: Operation) -> Self {
        Self { target, operation }
    }
}

/// A customer's session.
///
/// Events are processed strictly in order, each awaited before the next is
/// issued. A failed event is logged and recorded in the trace but never
/// stops the remaining events.
#[derive(Debug)]
pub struct CustomerSession<C = ConnectionPool> {
    id: CustomerId,
    client: C,
    balance: i64,
    trace: Vec<TraceEntry>,
    records: Vec<SessionRecord>,
}

impl<C: ReplicaClient> CustomerSession<C> {
    pub fn new(id: CustomerId, client: C) -> Self {
        Self {
            id,
            client,
            balance: 0,
            trace: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn id(&self) -> CustomerId {
        self.id
    }

    /// Balance reported by the most recent successful event.
    ///
    /// Failed events never change it, even when the replica attached its
    /// balance to the rejection.
    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// One entry per processed event, in event order.
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn records(&self) -> &[SessionRecord] {
        &self.records
    }

    /// Runs every event in order.
    pub async fn run_events(&mut self, events: &[SessionEvent]) {
        for &event in events {
            // Failures are already logged and traced by `run_event`.
            let _ = self.run_event(event).await;
        }
    }

    /// Runs a single event and appends its trace entry.
    pub async fn run_event(&mut self, event: SessionEvent) -> SessionResult<i64> {
        let SessionEvent { target, operation } = event;

        match self.client.invoke(target, operation).await {
            Ok(balance) => {
                info!(
                    customer_id = %self.id,
                    replica_id = %target,
                    op = operation.kind().as_str(),
                    amount = operation.amount(),
                    balance,
                    "event completed"
                );
                self.balance = balance;
                self.trace.push(TraceEntry::completed(operation, balance));
                self.records.push(SessionRecord {
                    target,
                    operation,
                    success: true,
                    balance: Some(balance),
                });
                Ok(balance)
            }
            Err(source) => {
                let err = SessionError::Call {
                    customer: self.id,
                    replica: target,
                    source,
                };
                error!(
                    customer_id = %self.id,
                    replica_id = %target,
                    op = operation.kind().as_str(),
                    amount = operation.amount(),
                    error = %err,
                    "event failed"
                );

                self.trace.push(TraceEntry::failed(operation));
                self.records.push(SessionRecord {
                    target,
                    operation,
                    success: false,
                    balance: err.balance(),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use branchmesh_replica::RpcError;
    use branchmesh_wire::ErrorCode;

    use super::*;
    use crate::trace::{EventStatus, Outcome};

    /// Answers calls from a fixed script and records the targets.
    #[derive(Default)]
    struct ScriptedClient {
        answers: Mutex<VecDeque<RpcResult<i64>>>,
        calls: Mutex<Vec<(ReplicaId, Operation)>>,
    }

    impl ScriptedClient {
        fn new(answers: impl IntoIterator<Item = RpcResult<i64>>) -> Self {
            Self {
                answers: Mutex::new(answers.into_iter().collect()),
                calls: Mutex::default(),
            }
        }
    }

    impl ReplicaClient for ScriptedClient {
        async fn invoke(&self, target: ReplicaId, operation: Operation) -> RpcResult<i64> {
            self.calls.lock().unwrap().push((target, operation));
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(RpcError::ConnectionClosed))
        }
    }

    fn remote(code: ErrorCode, balance: Option<i64>) -> RpcError {
        RpcError::Remote {
            code,
            message: code.to_string(),
            balance,
        }
    }

    fn events() -> Vec<SessionEvent> {
        vec![
            SessionEvent::new(ReplicaId::new(1), Operation::Deposit { amount: 10 }),
            SessionEvent::new(ReplicaId::new(1), Operation::Withdraw { amount: 500 }),
            SessionEvent::new(ReplicaId::new(2), Operation::Query),
        ]
    }

    #[tokio::test]
    async fn runs_events_in_order_and_traces_each() {
        let client = ScriptedClient::new([Ok(110), Ok(105), Ok(105)]);
        let mut session = CustomerSession::new(CustomerId::new(1), client);

        session.run_events(&events()).await;

        let targets: Vec<_> = session
            .client
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(target, _)| target.as_u32())
            .collect();
        assert_eq!(targets, vec![1, 1, 2]);
        assert_eq!(session.trace().len(), 3);
        assert_eq!(session.trace()[2].outcome, Outcome::Balance(105));
        assert_eq!(session.balance(), 105);
    }

    #[tokio::test]
    async fn failure_does_not_abort_remaining_events() {
        let client = ScriptedClient::new([
            Err(remote(ErrorCode::RemoteUnavailable, None)),
            Ok(100),
            Ok(100),
        ]);
        let mut session = CustomerSession::new(CustomerId::new(1), client);

        session.run_events(&events()).await;

        assert_eq!(
            session.trace()[0].outcome,
            Outcome::Result(EventStatus::Failure)
        );
        assert_eq!(
            session.trace()[1].outcome,
            Outcome::Result(EventStatus::Success)
        );
        assert_eq!(session.records().len(), 3);
        assert!(!session.records()[0].success);
    }

    #[tokio::test]
    async fn failure_without_balance_keeps_prior_balance() {
        let client = ScriptedClient::new([Ok(110), Err(remote(ErrorCode::PeerRejected, None))]);
        let mut session = CustomerSession::new(CustomerId::new(1), client);

        session.run_events(&events()[..2]).await;
        assert_eq!(session.balance(), 110);
    }

    #[tokio::test]
    async fn insufficient_funds_keeps_prior_balance_but_records_reported_one() {
        let client = ScriptedClient::new([
            Ok(110),
            Err(remote(ErrorCode::InsufficientFunds, Some(40))),
        ]);
        let mut session = CustomerSession::new(CustomerId::new(1), client);

        session.run_event(events()[0]).await.unwrap();
        let err = session.run_event(events()[1]).await.unwrap_err();

        assert_eq!(err.balance(), Some(40));
        assert_eq!(session.balance(), 110);
        assert_eq!(session.records()[1].balance, Some(40));
    }

    #[tokio::test]
    async fn failed_query_is_traced_as_failure() {
        let client = ScriptedClient::new([Err(RpcError::ConnectionClosed)]);
        let mut session = CustomerSession::new(CustomerId::new(3), client);

        session.run_events(&events()[2..]).await;
        assert_eq!(
            session.trace(),
            &[TraceEntry::failed(Operation::Query)]
        );
        assert_eq!(session.balance(), 0);
    }
}
