//! Session trace entries, in the JSON shape written to the output file.

use branchmesh_types::{Operation, OperationKind, ReplicaId};
use serde::{Deserialize, Serialize};

/// Whether a deposit or withdraw (or a failed query) succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Failure,
}

/// What the trace shows for one event.
///
/// Flattened into [`TraceEntry`], so a successful query serializes as
/// `"balance": 105` and everything else as `"result": "success"` or
/// `"result": "failure"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "balance")]
    Balance(i64),
    #[serde(rename = "result")]
    Result(EventStatus),
}

/// One entry of a session's trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub interface: OperationKind,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl TraceEntry {
    /// Entry for an event that completed.
    pub fn completed(operation: Operation, balance: i64) -> Self {
        let outcome = match operation {
            Operation::Query => Outcome::Balance(balance),
            Operation::Deposit { .. } | Operation::Withdraw { .. } => {
                Outcome::Result(EventStatus::Success)
            }
        };
        Self {
            interface: operation.kind(),
            outcome,
        }
    }

    /// Entry for an event that failed.
    pub fn failed(operation: Operation) -> Self {
        Self {
            interface: operation.kind(),
            outcome: Outcome::Result(EventStatus::Failure),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, Outcome::Result(EventStatus::Failure))
    }
}

/// Full history of one event, kept alongside the trace for guarantee checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
    /// Replica the event was sent to.
    pub target: ReplicaId,
    pub operation: Operation,
    pub success: bool,
    /// Balance reported by the replica, if any. Failed events only carry
    /// one when the replica rejected a withdraw for insufficient funds.
    pub balance: Option<i64>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test_case(TraceEntry::completed(Operation::Deposit { amount: 10 }, 110), json!({"interface": "deposit", "result": "success"}); "deposit success")]
    #[test_case(TraceEntry::failed(Operation::Withdraw { amount: 10 }), json!({"interface": "withdraw", "result": "failure"}); "withdraw failure")]
    #[test_case(TraceEntry::completed(Operation::Query, 105), json!({"interface": "query", "balance": 105}); "query balance")]
    #[test_case(TraceEntry::failed(Operation::Query), json!({"interface": "query", "result": "failure"}); "query failure")]
    fn serializes_to_trace_shape(entry: TraceEntry, expected: serde_json::Value) {
        assert_eq!(serde_json::to_value(entry).unwrap(), expected);
    }

    #[test]
    fn parses_trace_lines() {
        let entry: TraceEntry =
            serde_json::from_str(r#"{"interface":"query","balance":-20}"#).unwrap();
        assert_eq!(entry, TraceEntry::completed(Operation::Query, -20));
        assert!(entry.is_success());

        let entry: TraceEntry =
            serde_json::from_str(r#"{"interface":"deposit","result":"failure"}"#).unwrap();
        assert!(!entry.is_success());
    }
}
