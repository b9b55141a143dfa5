//! Results of a cluster run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use branchmesh_client::{GuaranteeResult, TraceEntry};
use branchmesh_types::{CustomerId, ReplicaId, RunMode};
use serde::{Deserialize, Serialize};

use crate::error::ClusterResult;

/// What a run reports for one customer, one JSON line each.
///
/// Sequential runs report the full trace (`{"id": 0, "recv": [...]}`),
/// concurrent runs only the final observed balance (`{"id": 0,
/// "balance": 105}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionOutput {
    Trace { id: CustomerId, recv: Vec<TraceEntry> },
    Balance { id: CustomerId, balance: i64 },
}

impl SessionOutput {
    pub fn id(&self) -> CustomerId {
        match self {
            Self::Trace { id, .. } | Self::Balance { id, .. } => *id,
        }
    }
}

/// A replica's balance at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaBalance {
    pub id: ReplicaId,
    pub balance: i64,
}

/// A session guarantee a customer's session did not get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionViolation {
    pub customer: CustomerId,
    pub result: GuaranteeResult,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub mode: RunMode,
    /// One entry per customer, in declaration order.
    pub outputs: Vec<SessionOutput>,
    /// Final balances, in branch declaration order.
    pub replica_balances: Vec<ReplicaBalance>,
    /// Guarantee violations. Always empty for concurrent runs, where
    /// sessions interleave and the checks do not apply.
    pub violations: Vec<SessionViolation>,
}

impl RunReport {
    /// Returns true when every replica ended with the same balance.
    pub fn converged(&self) -> bool {
        self.replica_balances
            .windows(2)
            .all(|pair| pair[0].balance == pair[1].balance)
    }

    /// Writes the outputs as JSON Lines.
    pub fn write_json_lines(&self, mut writer: impl Write) -> ClusterResult<()> {
        for output in &self.outputs {
            serde_json::to_writer(&mut writer, output)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes the outputs to `path`, replacing any previous content.
    pub fn write_to_path(&self, path: impl AsRef<Path>) -> ClusterResult<()> {
        let file = File::create(path)?;
        self.write_json_lines(BufWriter::new(file))
    }
}
