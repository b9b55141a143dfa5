//! Scenario-driven cluster runs for branchmesh.
//!
//! Provides local, in-process cluster orchestration:
//! - Scenario parsing and validation
//! - Replica startup on fixed or ephemeral ports
//! - Sequential or concurrent customer sessions
//! - Graceful shutdown and a run report
//!
//! ```ignore
//! let scenario = Scenario::from_file("input.json")?;
//! let report = ClusterDriver::run(&scenario, DriverOptions::default()).await?;
//! report.write_to_path("output.txt")?;
//! ```

pub mod driver;
pub mod error;
pub mod report;
pub mod scenario;

pub use driver::{ClusterDriver, DriverOptions};
pub use error::{ClusterError, ClusterResult};
pub use report::{ReplicaBalance, RunReport, SessionOutput, SessionViolation};
pub use scenario::{BranchSpec, CustomerPlan, CustomerSpec, Entity, Scenario, ScenarioEvent};

/// Runs `scenario` start to finish.
pub async fn run_scenario(scenario: &Scenario, options: DriverOptions) -> ClusterResult<RunReport> {
    ClusterDriver::run(scenario, options).await
}
