//! Run command: start the replicas, drive the customers, write the results.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use branchmesh_cluster::{ClusterDriver, DriverOptions, RunReport, Scenario};
use branchmesh_config::BranchmeshConfig;
use branchmesh_types::RunMode;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, Table};
use tracing::{info, warn};

/// Arguments of `branchmesh run`. Flags left unset fall back to the
/// loaded configuration.
pub struct RunArgs {
    pub scenario: PathBuf,
    pub output: Option<PathBuf>,
    pub mode: Option<RunMode>,
    pub base_port: Option<u16>,
    pub check: bool,
    pub summary: bool,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let mut config = BranchmeshConfig::load().context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let scenario = Scenario::from_file(&args.scenario)
        .with_context(|| format!("Failed to load scenario {}", args.scenario.display()))?;

    let options = DriverOptions::from_config(&config);
    info!(
        branches = scenario.branches().len(),
        customers = scenario.customers().len(),
        mode = %options.mode,
        base_port = options.base_port,
        "running scenario"
    );

    let report = ClusterDriver::run(&scenario, options)
        .await
        .context("Scenario run failed")?;

    match &config.output.path {
        Some(path) => {
            report
                .write_to_path(path)
                .with_context(|| format!("Failed to write results to {}", path.display()))?;
            info!(path = %path.display(), customers = report.outputs.len(), "results written");
        }
        None => report
            .write_json_lines(io::stdout().lock())
            .context("Failed to write results")?,
    }

    if args.summary {
        eprintln!("{}", balances_table(&report));
    }

    if args.check {
        check_guarantees(&report)?;
    }

    Ok(())
}

/// Command-line flags take precedence over every configuration source.
fn apply_overrides(config: &mut BranchmeshConfig, args: &RunArgs) {
    if let Some(mode) = args.mode {
        config.run.mode = mode;
    }
    if let Some(base_port) = args.base_port {
        config.cluster.base_port = base_port;
    }
    if let Some(output) = &args.output {
        config.output.path = Some(output.clone());
    }
}

fn check_guarantees(report: &RunReport) -> Result<()> {
    if report.mode == RunMode::Concurrent {
        warn!("session guarantee checks only apply to sequential runs; skipped");
        return Ok(());
    }

    for violation in &report.violations {
        eprintln!("customer {}: {}", violation.customer, violation.result);
    }
    if !report.violations.is_empty() {
        bail!(
            "{} session guarantee violation(s) detected",
            report.violations.len()
        );
    }

    eprintln!("session guarantees held for all customers");
    Ok(())
}

fn balances_table(report: &RunReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Replica", "Final balance"]);

    for replica in &report.replica_balances {
        table.add_row(vec![
            Cell::new(replica.id),
            Cell::new(replica.balance).set_alignment(CellAlignment::Right),
        ]);
    }

    table
}
