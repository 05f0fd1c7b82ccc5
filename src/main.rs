//! multiboot - build a multi-installer macOS boot disk.
//!
//! Finds every supported installer bundle on this Mac, splits one external
//! disk into a volume per installer and writes each with the bundle's own
//! `createinstallmedia`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::prelude::*;

use multiboot::config::Config;
use multiboot::orchestrator::Orchestrator;
use multiboot::prompt::TerminalOperator;
use multiboot::{interrupt, preflight};

#[derive(Parser)]
#[command(name = "multiboot")]
#[command(about = "Create a multiboot USB disk with several macOS installers")]
#[command(
    after_help = "Run with sudo. Every installer found in the installer directory gets its own volume;\nthe selected disk is erased."
)]
struct Cli {
    /// Show detailed logs
    #[arg(long)]
    debug: bool,

    /// Directory searched for installers (default: /Applications)
    #[arg(long, value_name = "DIR")]
    app_dir: Option<PathBuf>,
}

fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    // Allow RUST_LOG to override if set
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load().with_app_dir(cli.app_dir);
    config.print();

    interrupt::install_handler()?;
    preflight::run_preflight_or_fail(&config)?;

    let mut orchestrator = Orchestrator::new(config, TerminalOperator);
    let status = orchestrator.run();
    Ok(ExitCode::from(status.code()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
