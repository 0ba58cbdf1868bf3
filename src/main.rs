// Copyright 2026 Pricelens Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code, unused_imports)]

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

mod analyze;
mod browser;
mod cli;
mod collect;
mod config;
mod extract;
mod normalize;
mod round;
mod schedule;
mod store;

#[derive(Parser)]
#[command(
    name = "pricelens",
    about = "Pricelens — detect price personalization by probing retailers under synthetic identities",
    version,
    after_help = "Run 'pricelens <command> --help' for details on each command."
)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value = "pricelens.json")]
    config: PathBuf,

    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one audit round now
    Run,
    /// Run rounds on the configured wall-clock schedule
    Watch,
    /// Smoke-test one target with the first identity (nothing persisted)
    Probe {
        /// Target name to probe (defaults to the first configured)
        target: Option<String>,
    },
    /// Re-analyze the stored observation history
    Analyze {
        /// Override the significance threshold (currency units)
        #[arg(long)]
        threshold: Option<f64>,
        /// Override the comparison bucket width in minutes
        #[arg(long)]
        bucket_minutes: Option<i64>,
        /// Also write a plain-text report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if args.json {
        std::env::set_var("PRICELENS_JSON", "1");
    }
    if args.quiet {
        std::env::set_var("PRICELENS_QUIET", "1");
    }

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match args.command {
        Commands::Run => cli::run_cmd::run(&args.config).await,
        Commands::Watch => cli::watch_cmd::run(&args.config).await,
        Commands::Probe { target } => {
            cli::probe_cmd::run(&args.config, target.as_deref()).await
        }
        Commands::Analyze {
            threshold,
            bucket_minutes,
            report,
        } => {
            cli::analyze_cmd::run(&args.config, threshold, bucket_minutes, report.as_deref())
                .await
        }
        Commands::Init { force } => cli::init_cmd::run(&args.config, force).await,
        Commands::Doctor => cli::doctor::run(&args.config).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pricelens", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
