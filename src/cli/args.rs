//! @dose
//! purpose: This module defines the command-line interface for tokenmeter using the clap derive
//!     macros. It specifies all commands (count, watch, serve) and their arguments.
//!
//! when-editing:
//!     - !Each command struct must derive Args and be added to the Commands enum
//!     - !Global flags (root, verbose, encoding) are defined on Cli and propagate to all subcommands
//!     - Flags left unset fall back to tokenmeter.toml, then to built-in defaults
//!
//! invariants:
//!     - The Cli struct is the root parser that clap uses to parse command-line arguments
//!     - PathBuf is used for all file/directory path arguments to ensure proper path handling
//!
//! gotchas:
//!     - Debounce delays are Option so "not given" can be told apart from "given as the default"
//!     - The --root flag is global but optional; defaults to current directory in main.rs

use crate::engine::EncodingName;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tokenmeter")]
#[command(author, version, about = "Live BPE token counts for text documents")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to project root (defaults to current directory)
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// BPE encoding (overrides tokenmeter.toml)
    #[arg(short, long, global = true, value_enum)]
    pub encoding: Option<EncodingName>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Count tokens in files
    Count(CountArgs),

    /// Watch files and keep a live token count for the most recently changed one
    Watch(WatchArgs),

    /// Run the tokenization worker over stdio (one JSON message per line)
    Serve,
}

#[derive(Args, Default)]
pub struct CountArgs {
    /// Files to count
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Use the instant chars/4 estimate instead of running the encoder
    #[arg(long)]
    pub fast: bool,

    /// Emit one JSON object per file
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Default)]
pub struct WatchArgs {
    /// Files to watch
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Quiet period before the approximate count, in milliseconds
    #[arg(long, value_name = "MS")]
    pub approximate_delay: Option<u64>,

    /// Quiet period before the exact count and heavy-line scan, in milliseconds
    #[arg(long, value_name = "MS")]
    pub reconcile_delay: Option<u64>,
}
