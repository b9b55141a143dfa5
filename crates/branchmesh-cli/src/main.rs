//! branchmesh CLI.
//!
//! Runs replicated-ledger scenarios and records what each customer observed.
//!
//! # Quick Start
//!
//! ```bash
//! # Check a scenario file
//! branchmesh validate --scenario input.json
//!
//! # Run it, one customer at a time, writing traces to output.txt
//! branchmesh run --scenario input.json --output output.txt --summary
//!
//! # Run every customer at once on ephemeral ports
//! branchmesh run --scenario input.json --mode concurrent --base-port 0
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use branchmesh_types::RunMode;
use clap::{Parser, Subcommand};

/// branchmesh - replicated ledger simulation for studying session guarantees.
#[derive(Parser)]
#[command(name = "branchmesh")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Run a scenario against a freshly started replica set.
    Run {
        /// Scenario file (JSON array of branches and customers).
        #[arg(short, long)]
        scenario: PathBuf,

        /// Write customer results here instead of standard output.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Session scheduling: sequential or concurrent.
        #[arg(short, long)]
        mode: Option<RunMode>,

        /// Port of replica 0; replica N listens on base port + N. 0 picks
        /// ephemeral ports.
        #[arg(short = 'p', long)]
        base_port: Option<u16>,

        /// Fail if a sequential run violates a session guarantee.
        #[arg(long)]
        check: bool,

        /// Print final replica balances.
        #[arg(long)]
        summary: bool,
    },

    /// Parse and validate a scenario without running it.
    Validate {
        /// Scenario file to check.
        #[arg(short, long)]
        scenario: PathBuf,

        /// Also print the effective configuration.
        #[arg(long)]
        show_config: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; standard output is reserved for results.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Run {
            scenario,
            output,
            mode,
            base_port,
            check,
            summary,
        } => {
            commands::run::run(commands::run::RunArgs {
                scenario,
                output,
                mode,
                base_port,
                check,
                summary,
            })
            .await
        }
        Commands::Validate {
            scenario,
            show_config,
        } => commands::validate::run(&scenario, show_config),
    }
}
