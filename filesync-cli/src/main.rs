//! repo-file-sync - keep shared files in step with their source repositories.
//!
//! # Usage
//!
//! ```text
//! repo-file-sync sync [--config <path>] [--dry-run] [--create-pr] [--strict] ...
//! repo-file-sync check-config [--config <path>] [--json]
//! repo-file-sync test-connection [--token <token>]
//! ```
//!
//! Exit codes: 0 success, 1 some sources failed, 2 configuration, setup,
//! publish or timeout failure.

mod commands;
mod logging;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::{check_config::CheckConfigArgs, sync::SyncArgs, test_connection::TestConnectionArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "repo-file-sync",
    version,
    about = "Sync files from source repositories into this one and open a pull request",
    long_about = None,
)]
struct Cli {
    /// Debug-level logging (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch configured files, commit them and optionally open a pull request.
    Sync(SyncArgs),

    /// Resolve the configuration and print the copy jobs without fetching.
    CheckConfig(CheckConfigArgs),

    /// Check that the GitHub API is reachable with the given token.
    TestConnection(TestConnectionArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::CheckConfig(args) => args.run(),
        Commands::TestConnection(args) => args.run(),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(2)
        }
    }
}
