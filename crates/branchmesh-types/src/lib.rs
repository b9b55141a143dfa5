//! # branchmesh-types: Core types for `branchmesh`
//!
//! This crate contains shared types used across the `branchmesh` system:
//! - Entity IDs ([`ReplicaId`], [`CustomerId`])
//! - Client operations ([`Operation`], [`OperationKind`])
//! - Replica-to-replica propagation ([`PropagationMessage`], [`PropagationKind`])
//! - Session scheduling ([`RunMode`])

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Entity IDs - All Copy
// ============================================================================

/// Identity of a ledger replica ("branch").
///
/// Replica identities are small integers, unique within a cluster. Together
/// with a shared base port they also determine the replica's listening
/// address (`base_port + id`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ReplicaId(u32);

impl ReplicaId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the identity as a `u32`.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ReplicaId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<ReplicaId> for u32 {
    fn from(id: ReplicaId) -> Self {
        id.0
    }
}

/// Identity of a client session ("customer").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(u64);

impl CustomerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the identity as a `u64`.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The replica a customer talks to when an event names no destination.
    ///
    /// Returns `None` if the customer id does not fit a replica identity.
    pub fn home_replica(&self) -> Option<ReplicaId> {
        u32::try_from(self.0).ok().map(ReplicaId::new)
    }
}

impl Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CustomerId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================================================
// Client operations
// ============================================================================

/// The client-facing interface an operation invokes.
///
/// Serialized in lowercase (`"query"`, `"deposit"`, `"withdraw"`), which is
/// the spelling used by scenario files and session traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Deposit,
    Withdraw,
}

impl OperationKind {
    /// Returns true for operations that mutate the balance.
    pub fn is_write(self) -> bool {
        !matches!(self, Self::Query)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client operation against a single replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Query,
    Deposit { amount: i64 },
    Withdraw { amount: i64 },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Query => OperationKind::Query,
            Self::Deposit { .. } => OperationKind::Deposit,
            Self::Withdraw { .. } => OperationKind::Withdraw,
        }
    }

    /// Returns the amount carried by a write, `None` for queries.
    pub fn amount(&self) -> Option<i64> {
        match self {
            Self::Query => None,
            Self::Deposit { amount } | Self::Withdraw { amount } => Some(*amount),
        }
    }

    /// The signed effect this operation has on a balance when it succeeds.
    ///
    /// Saturates for a withdraw of `i64::MIN`, which no replica accepts.
    pub fn balance_delta(&self) -> i64 {
        match self {
            Self::Query => 0,
            Self::Deposit { amount } => *amount,
            Self::Withdraw { amount } => amount.saturating_neg(),
        }
    }
}

// ============================================================================
// Propagation
// ============================================================================

/// Which write a propagation message replays on a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropagationKind {
    Deposit,
    Withdraw,
}

impl Display for PropagationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => f.write_str("deposit"),
            Self::Withdraw => f.write_str("withdraw"),
        }
    }
}

/// A write broadcast from one replica to another.
///
/// Carries no causal or version metadata; the receiver applies it
/// immediately (deposits) or after checking its own balance (withdraws).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationMessage {
    pub origin: ReplicaId,
    pub amount: i64,
    pub kind: PropagationKind,
}

impl PropagationMessage {
    pub fn deposit(origin: ReplicaId, amount: i64) -> Self {
        Self {
            origin,
            amount,
            kind: PropagationKind::Deposit,
        }
    }

    pub fn withdraw(origin: ReplicaId, amount: i64) -> Self {
        Self {
            origin,
            amount,
            kind: PropagationKind::Withdraw,
        }
    }
}

// ============================================================================
// Run mode
// ============================================================================

/// How a cluster run schedules its customer sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// One customer at a time, in declaration order.
    #[default]
    Sequential,
    /// All customers at once, each still sequential internally.
    Concurrent,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
        }
    }
}

impl Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "concurrent" => Ok(Self::Concurrent),
            other => Err(format!(
                "unknown run mode '{other}' (expected 'sequential' or 'concurrent')"
            )),
        }
    }
}
