//! Error types for cluster runs.

use std::path::PathBuf;

use branchmesh_replica::{RegistryError, ServerError};
use thiserror::Error;

/// Cluster run errors.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Scenario file could not be read.
    #[error("Failed to read scenario {path}: {source}")]
    ScenarioRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Scenario is not valid JSON of the expected shape.
    #[error("Malformed scenario: {0}")]
    ScenarioParse(#[from] serde_json::Error),

    /// Scenario parsed but describes an impossible run.
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    /// Replica addresses could not be assigned.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A replica failed to bind or stop.
    #[error("Replica server error: {0}")]
    Server(#[from] ServerError),

    /// A concurrently running session panicked.
    #[error("Session task failed: {0}")]
    SessionTask(String),
}

impl ClusterError {
    /// Returns true for errors caused by the run's inputs rather than by
    /// the environment.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ScenarioParse(_) | Self::InvalidScenario(_) | Self::Registry(_)
        )
    }
}

/// Result type for cluster operations.
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;
