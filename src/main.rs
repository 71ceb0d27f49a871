//! @dose
//! purpose: This is the CLI entry point for tokenmeter. It parses command-line arguments using
//!     clap, loads tokenmeter.toml from the project root, initializes logging, and dispatches to
//!     the appropriate command handler (count, watch, or serve).
//!
//! when-editing:
//!     - !All command handlers are imported from the tokenmeter crate
//!     - !The root directory defaults to current working directory if not specified
//!     - Error messages are printed to stderr and exit with code 1
//!
//! invariants:
//!     - One and only one subcommand is always executed per invocation
//!     - The process exits with 0 on success, 1 on any error
//!     - CLI flags win over tokenmeter.toml
//!
//! do-not:
//!     - Never add business logic here - delegate to command modules
//!     - Never write logs to stdout; count --json and serve own it

use anyhow::Context;
use clap::Parser;
use std::env;
use tokenmeter::cli::{Cli, Commands};
use tokenmeter::commands::{run_count, run_serve, run_watch};
use tokenmeter::config::Config;
use tokenmeter::logging::init_tracing;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Determine root directory
    let root = match cli.root {
        Some(root) => root,
        None => env::current_dir().context("Failed to get current directory")?,
    };

    let mut config = Config::load(&root);
    if let Some(encoding) = cli.encoding {
        config.encoding = encoding;
    }

    match cli.command {
        Commands::Count(args) => run_count(&args, &root, &config),
        Commands::Watch(args) => run_watch(&args, &root, &config),
        Commands::Serve => run_serve(&config),
    }
}
