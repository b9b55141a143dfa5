//! Customer sessions against live replicas.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use branchmesh_client::{CustomerSession, Outcome, SessionEvent, TraceEntry, check_session};
use branchmesh_replica::{ConnectionPool, LedgerReplica, ReplicaHandle, ReplicaRegistry, ReplicaServer};
use branchmesh_types::{CustomerId, Operation, ReplicaId};

async fn start(balances: &[i64]) -> (Vec<ReplicaHandle<ConnectionPool>>, ConnectionPool) {
    let mut servers = Vec::new();
    for (id, &balance) in (0u32..).zip(balances) {
        let server = ReplicaServer::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0))
            .await
            .unwrap();
        servers.push((ReplicaId::new(id), balance, server));
    }

    let registry = Arc::new(
        ReplicaRegistry::from_addresses(
            servers
                .iter()
                .map(|(id, _, server)| (*id, server.local_addr())),
        )
        .unwrap(),
    );

    let handles = servers
        .into_iter()
        .map(|(id, balance, server)| {
            let pool = ConnectionPool::new(Arc::clone(&registry));
            server.serve(Arc::new(LedgerReplica::new(
                id,
                balance,
                registry.peers_of(id),
                pool,
            )))
        })
        .collect();

    (handles, ConnectionPool::new(registry))
}

async fn stop(handles: &mut [ReplicaHandle<ConnectionPool>]) {
    for handle in handles {
        handle.stop().await.unwrap();
    }
}

#[tokio::test]
async fn query_observes_preceding_deposit() {
    let (mut handles, pool) = start(&[100]).await;
    let mut session = CustomerSession::new(CustomerId::new(0), pool);

    session
        .run_events(&[
            SessionEvent::new(ReplicaId::new(0), Operation::Deposit { amount: 10 }),
            SessionEvent::new(ReplicaId::new(0), Operation::Query),
        ])
        .await;

    assert_eq!(session.trace()[1], TraceEntry::completed(Operation::Query, 110));
    stop(&mut handles).await;
}

#[tokio::test]
async fn three_replica_session_holds_guarantees() {
    let (mut handles, pool) = start(&[100, 100, 100]).await;
    let mut session = CustomerSession::new(CustomerId::new(0), pool);

    session
        .run_events(&[
            SessionEvent::new(ReplicaId::new(0), Operation::Deposit { amount: 10 }),
            SessionEvent::new(ReplicaId::new(0), Operation::Withdraw { amount: 5 }),
            SessionEvent::new(ReplicaId::new(1), Operation::Query),
        ])
        .await;

    assert_eq!(
        session.trace(),
        &[
            TraceEntry::completed(Operation::Deposit { amount: 10 }, 110),
            TraceEntry::completed(Operation::Withdraw { amount: 5 }, 105),
            TraceEntry::completed(Operation::Query, 105),
        ]
    );
    assert!(check_session(session.records()).is_empty());

    let balances: Vec<_> = handles.iter().map(ReplicaHandle::balance).collect();
    assert_eq!(balances, vec![105, 105, 105]);
    stop(&mut handles).await;
}

#[tokio::test]
async fn differing_initial_balances_surface_as_read_your_writes_violation() {
    let (mut handles, pool) = start(&[100, 200, 300]).await;
    let mut session = CustomerSession::new(CustomerId::new(0), pool);

    session
        .run_events(&[
            SessionEvent::new(ReplicaId::new(0), Operation::Deposit { amount: 10 }),
            SessionEvent::new(ReplicaId::new(0), Operation::Withdraw { amount: 5 }),
            SessionEvent::new(ReplicaId::new(1), Operation::Query),
        ])
        .await;

    assert_eq!(session.trace()[2].outcome, Outcome::Balance(205));
    assert_eq!(check_session(session.records()).len(), 1);
    stop(&mut handles).await;
}

#[tokio::test]
async fn overdraw_is_traced_as_failure_and_keeps_prior_balance() {
    let (mut handles, pool) = start(&[50, 50]).await;
    let mut session = CustomerSession::new(CustomerId::new(1), pool);

    session
        .run_events(&[SessionEvent::new(
            ReplicaId::new(1),
            Operation::Withdraw { amount: 80 },
        )])
        .await;

    assert_eq!(
        session.trace(),
        &[TraceEntry::failed(Operation::Withdraw { amount: 80 })]
    );
    // The rejection reports the replica's 50, but the session saw no
    // successful event yet.
    assert_eq!(session.balance(), 0);
    assert_eq!(session.records()[0].balance, Some(50));
    stop(&mut handles).await;
}
