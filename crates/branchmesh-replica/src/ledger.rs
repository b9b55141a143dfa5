//! The ledger replica: local balance plus the full-mesh broadcast protocol.
//!
//! # Write paths
//!
//! Deposits and withdraws deliberately follow different orderings:
//!
//! ```text
//! deposit:   apply locally ──► broadcast ──► reply
//!                              (failure: local change is kept)
//!
//! withdraw:  check locally ──► broadcast ──► apply locally ──► reply
//!                              (failure: nothing applied locally)
//! ```
//!
//! Deposits are therefore not atomic across the replica set when a peer
//! fails, and withdraws are exposed to a check-then-act race: two concurrent
//! withdraws can both pass the sufficiency check against the same balance
//! and both apply afterwards, driving the balance below zero.
//!
//! Peers re-check sufficiency against their *own* balance when a withdraw is
//! propagated, so replicas whose balances have diverged can disagree about
//! whether the same withdraw is allowed.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};

use branchmesh_types::{PropagationMessage, ReplicaId};
use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::error::{PeerError, ReplicaError, ReplicaResult};

/// Delivers propagation messages to peer replicas.
///
/// Implemented by [`ConnectionPool`](crate::ConnectionPool) over TCP; tests
/// substitute in-process transports.
pub trait PeerTransport: Clone + Send + Sync + 'static {
    /// Sends `message` to `peer` and waits for its acknowledgement.
    fn propagate(
        &self,
        peer: ReplicaId,
        message: PropagationMessage,
    ) -> impl Future<Output = Result<(), PeerError>> + Send;
}

/// One replica of the shared account.
#[derive(Debug)]
pub struct LedgerReplica<T> {
    id: ReplicaId,
    balance: AtomicI64,
    peers: Vec<ReplicaId>,
    transport: T,
}

impl<T: PeerTransport> LedgerReplica<T> {
    pub fn new(id: ReplicaId, initial_balance: i64, peers: Vec<ReplicaId>, transport: T) -> Self {
        Self {
            id,
            balance: AtomicI64::new(initial_balance),
            peers,
            transport,
        }
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub fn peers(&self) -> &[ReplicaId] {
        &self.peers
    }

    /// Current local balance.
    pub fn balance(&self) -> i64 {
        self.balance.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Client surface
    // ------------------------------------------------------------------

    /// Reads the local balance. Never propagates, never fails.
    pub fn query(&self) -> i64 {
        self.balance()
    }

    /// Adds `amount` locally, then broadcasts it to every peer.
    ///
    /// If any peer fails the error is returned, but the local increment is
    /// not rolled back. A deposit the balance cannot hold is rejected before
    /// anything is applied or propagated.
    pub async fn deposit(&self, amount: i64) -> ReplicaResult<i64> {
        validate_amount(amount)?;

        let applied = self.credit(amount)?;
        debug!(replica_id = %self.id, amount, balance = applied, "deposit applied locally");

        self.broadcast(PropagationMessage::deposit(self.id, amount))
            .await?;

        Ok(self.balance())
    }

    /// Checks the local balance, broadcasts, and subtracts `amount` once every
    /// peer has acknowledged.
    ///
    /// Fails with [`ReplicaError::InsufficientFunds`] before any propagation
    /// if the balance does not cover `amount`. If a peer fails, the local
    /// balance is left untouched.
    pub async fn withdraw(&self, amount: i64) -> ReplicaResult<i64> {
        validate_amount(amount)?;

        let balance = self.balance();
        if balance < amount {
            debug!(replica_id = %self.id, amount, balance, "withdraw rejected locally");
            return Err(ReplicaError::InsufficientFunds { balance, amount });
        }

        self.broadcast(PropagationMessage::withdraw(self.id, amount))
            .await?;

        let applied = self.debit(amount)?;
        debug!(replica_id = %self.id, amount, balance = applied, "withdraw applied locally");
        Ok(applied)
    }

    // ------------------------------------------------------------------
    // Peer surface
    // ------------------------------------------------------------------

    /// Applies a deposit propagated by `origin`. Cannot fail on funds.
    pub fn propagate_deposit(&self, origin: ReplicaId, amount: i64) -> ReplicaResult<()> {
        validate_amount(amount)?;

        let applied = self.credit(amount)?;
        debug!(replica_id = %self.id, %origin, amount, balance = applied, "propagated deposit applied");
        Ok(())
    }

    /// Applies a withdraw propagated by `origin` if this replica's own
    /// balance covers it.
    pub fn propagate_withdraw(&self, origin: ReplicaId, amount: i64) -> ReplicaResult<()> {
        validate_amount(amount)?;

        match self
            .balance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |balance| {
                (balance >= amount).then(|| balance - amount)
            }) {
            Ok(previous) => {
                debug!(
                    replica_id = %self.id,
                    %origin,
                    amount,
                    balance = previous - amount,
                    "propagated withdraw applied"
                );
                Ok(())
            }
            Err(balance) => {
                warn!(
                    replica_id = %self.id,
                    %origin,
                    amount,
                    balance,
                    "propagated withdraw rejected: replica balances diverged"
                );
                Err(ReplicaError::InsufficientFunds { balance, amount })
            }
        }
    }

    /// Atomically adds `amount`, returning the new balance.
    fn credit(&self, amount: i64) -> ReplicaResult<i64> {
        self.balance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |balance| {
                balance.checked_add(amount)
            })
            .map(|previous| previous + amount)
            .map_err(|balance| ReplicaError::BalanceOverflow { balance, amount })
    }

    /// Atomically subtracts `amount` without a sufficiency check, returning
    /// the new balance.
    fn debit(&self, amount: i64) -> ReplicaResult<i64> {
        self.balance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |balance| {
                balance.checked_sub(amount)
            })
            .map(|previous| previous - amount)
            .map_err(|balance| ReplicaError::BalanceOverflow { balance, amount })
    }

    // ------------------------------------------------------------------
    // Broadcast
    // ------------------------------------------------------------------

    /// Sends `message` to every peer concurrently.
    ///
    /// Resolves once all peers acknowledged; returns the first failure
    /// observed otherwise. Calls still in flight at that point keep running
    /// to completion on their own tasks.
    async fn broadcast(&self, message: PropagationMessage) -> ReplicaResult<()> {
        if self.peers.is_empty() {
            return Ok(());
        }

        let calls: Vec<_> = self
            .peers
            .iter()
            .map(|&peer| {
                let transport = self.transport.clone();
                (
                    peer,
                    tokio::spawn(async move { transport.propagate(peer, message).await }),
                )
            })
            .collect();

        let result = try_join_all(calls.into_iter().map(|(peer, call)| async move {
            match call.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(ReplicaError::from_peer(peer, err)),
                Err(join) => Err(ReplicaError::RemoteUnavailable {
                    peer,
                    reason: join.to_string(),
                }),
            }
        }))
        .await;

        match result {
            Ok(_) => {
                debug!(
                    replica_id = %self.id,
                    kind = %message.kind,
                    amount = message.amount,
                    peers = self.peers.len(),
                    "broadcast acknowledged by all peers"
                );
                Ok(())
            }
            Err(err) => {
                warn!(replica_id = %self.id, kind = %message.kind, error = %err, "broadcast failed");
                Err(err)
            }
        }
    }
}

fn validate_amount(amount: i64) -> ReplicaResult<()> {
    if amount <= 0 {
        return Err(ReplicaError::InvalidAmount(amount));
    }
    Ok(())
}
