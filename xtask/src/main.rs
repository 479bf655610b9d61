// Host tooling crate: unwrap/expect/panic acceptable outside embedded code.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod check;
mod sample;
mod simulate;
mod validate;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "DSI panel runtime development tasks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the panel crates for the embedded target and the host
    Check,
    /// Run all tests (unit, integration, and doc)
    Test {
        /// Run only unit tests
        #[arg(long)]
        unit: bool,
        /// Run only integration tests
        #[arg(long)]
        integration: bool,
    },
    /// Write a sample panel description as JSON
    Template {
        /// Output file (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Load a JSON panel description and check it
    Validate {
        /// Panel description
        path: PathBuf,
    },
    /// Run a power cycle of a JSON panel description against mock hardware
    /// and print everything the hardware saw
    Simulate {
        /// Panel description
        path: PathBuf,
        /// Brightness requested once the panel is on
        #[arg(long, default_value_t = 128)]
        brightness: u32,
        /// Make the first ESD status read fail and run the recovery
        #[arg(long)]
        esd_failure: bool,
        /// Refresh rate requested once the panel is on
        #[arg(long)]
        fps: Option<u32>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check => check::run(),
        Commands::Test { unit, integration } => test::run(unit, integration),
        Commands::Template { out } => sample::run(out.as_deref()),
        Commands::Validate { path } => validate::run(&path),
        Commands::Simulate {
            path,
            brightness,
            esd_failure,
            fps,
        } => simulate::run(
            &path,
            &simulate::Scenario {
                brightness,
                esd_failure,
                fps,
            },
        ),
    }
}
