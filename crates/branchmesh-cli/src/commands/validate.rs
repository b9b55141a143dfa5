//! Validate command: check a scenario file without starting any replica.

use std::path::Path;

use anyhow::{Context, Result};
use branchmesh_cluster::Scenario;
use branchmesh_config::BranchmeshConfig;

pub fn run(scenario_path: &Path, show_config: bool) -> Result<()> {
    let scenario = Scenario::from_file(scenario_path)
        .with_context(|| format!("Invalid scenario {}", scenario_path.display()))?;

    println!(
        "Scenario OK: {} branches, {} customers, {} events",
        scenario.branches().len(),
        scenario.customers().len(),
        scenario.event_count()
    );

    if show_config {
        let config = BranchmeshConfig::load().context("Failed to load configuration")?;
        println!();
        print!("{}", config.to_toml()?);
    }

    Ok(())
}
