//! @dose
//! purpose: This is the library crate root for tokenmeter, exposing the public API for use as
//!     both a CLI tool and a library. Editors and other hosts embed the engine, scheduler and
//!     sink traits directly; the binary wires them to the terminal.
//!
//! when-editing:
//!     - !All public modules must be declared here with pub mod
//!     - !Re-exports should include commonly used types and functions
//!     - Keep the re-export list organized by module
//!
//! invariants:
//!     - The public API surface is stable - all re-exported items are public contract
//!
//! gotchas:
//!     - The lib.rs is separate from main.rs - library consumers get lib, CLI gets main
//!     - TokenEngine and UpdateScheduler need a running Tokio runtime

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod logging;
pub mod scheduler;
pub mod sink;
pub mod types;

// Re-export main types for convenience
pub use cli::{Cli, Commands, CountArgs, WatchArgs};
pub use config::{Config, ThresholdMatcher};
pub use engine::{
    spawn_worker, Encoder, EncodingName, EngineError, EngineOptions, TiktokenEncoder, TokenEngine,
    TokenWorker, WorkerOptions, WorkerTransport,
};
pub use scheduler::{DebounceSlot, ScheduleTimings, UpdateScheduler};
pub use sink::{HighlightSink, IndicatorSink, IndicatorThresholds, StatusLine};
pub use types::{
    DocumentHandle, HeavyRange, Severity, TokenizeResult, WorkerRequest, WorkerResponse,
};
