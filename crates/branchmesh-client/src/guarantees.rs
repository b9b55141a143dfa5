//! Session-guarantee checks over a recorded session history.
//!
//! The checkers assume the session ran in isolation: no other session wrote
//! to the account while it was running. Under that assumption every balance
//! a session observes is fully determined by its own writes, so any mismatch
//! is an anomaly of the replication protocol, not of interleaving.
//!
//! # Available Checkers
//!
//! - [`ReadYourWritesChecker`]: queries observe the session's latest write
//! - [`MonotonicWritesChecker`]: writes build on each other across replicas

use std::fmt::{self, Display};

use crate::trace::SessionRecord;

// ============================================================================
// Guarantee Result
// ============================================================================

/// A session guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guarantee {
    ReadYourWrites,
    MonotonicWrites,
}

impl Display for Guarantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadYourWrites => f.write_str("read-your-writes"),
            Self::MonotonicWrites => f.write_str("monotonic-writes"),
        }
    }
}

/// Result of checking a guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuaranteeResult {
    /// The guarantee holds.
    Holds,
    /// The guarantee is violated.
    Violated {
        guarantee: Guarantee,
        /// Index of the offending event in the session's event list.
        event_index: usize,
        expected: i64,
        observed: i64,
    },
}

impl GuaranteeResult {
    pub fn holds(&self) -> bool {
        matches!(self, Self::Holds)
    }
}

impl Display for GuaranteeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Holds => f.write_str("holds"),
            Self::Violated {
                guarantee,
                event_index,
                expected,
                observed,
            } => write!(
                f,
                "{guarantee} violated at event {event_index}: expected balance {expected}, observed {observed}"
            ),
        }
    }
}

// ============================================================================
// Read Your Writes
// ============================================================================

/// Every successful query must observe the balance produced by the session's
/// most recent successful write.
///
/// Before the first write, the first observed balance becomes the baseline.
#[derive(Debug, Default)]
pub struct ReadYourWritesChecker {
    expected: Option<i64>,
}

impl ReadYourWritesChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_record(&mut self, event_index: usize, record: &SessionRecord) -> GuaranteeResult {
        let (true, Some(observed)) = (record.success, record.balance) else {
            return GuaranteeResult::Holds;
        };

        if record.operation.kind().is_write() {
            self.expected = Some(observed);
            return GuaranteeResult::Holds;
        }

        match self.expected {
            Some(expected) if expected != observed => GuaranteeResult::Violated {
                guarantee: Guarantee::ReadYourWrites,
                event_index,
                expected,
                observed,
            },
            Some(_) => GuaranteeResult::Holds,
            None => {
                self.expected = Some(observed);
                GuaranteeResult::Holds
            }
        }
    }
}

// ============================================================================
// Monotonic Writes
// ============================================================================

/// Every successful write must report the previous write's balance adjusted
/// by its own amount, whichever replica served it.
#[derive(Debug, Default)]
pub struct MonotonicWritesChecker {
    last_write: Option<i64>,
}

impl MonotonicWritesChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_record(&mut self, event_index: usize, record: &SessionRecord) -> GuaranteeResult {
        if !record.success || !record.operation.kind().is_write() {
            return GuaranteeResult::Holds;
        }
        let Some(observed) = record.balance else {
            return GuaranteeResult::Holds;
        };

        let previous = self.last_write.replace(observed);
        match previous {
            Some(previous) => {
                let delta = record.operation.balance_delta();
                // Replicas reject writes that overflow, so an unrepresentable
                // expectation can never be matched.
                if previous.checked_add(delta) == Some(observed) {
                    GuaranteeResult::Holds
                } else {
                    GuaranteeResult::Violated {
                        guarantee: Guarantee::MonotonicWrites,
                        event_index,
                        expected: previous.saturating_add(delta),
                        observed,
                    }
                }
            }
            None => GuaranteeResult::Holds,
        }
    }
}

// ============================================================================
// Session check
// ============================================================================

/// Runs every checker over `records` and returns all violations, in event
/// order. An empty result means every guarantee held.
pub fn check_session(records: &[SessionRecord]) -> Vec<GuaranteeResult> {
    let mut read_your_writes = ReadYourWritesChecker::new();
    let mut monotonic_writes = MonotonicWritesChecker::new();

    records
        .iter()
        .enumerate()
        .flat_map(|(index, record)| {
            [
                read_your_writes.check_record(index, record),
                monotonic_writes.check_record(index, record),
            ]
        })
        .filter(|result| !result.holds())
        .collect()
}
