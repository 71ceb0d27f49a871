//! Tracing initialization for the tokenmeter binary.

use std::io;
use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

pub const LOG_ENV_VAR: &str = "TOKENMETER_LOG";

/// Filter used when `TOKENMETER_LOG` is unset or invalid
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "tokenmeter=debug"
    } else {
        "tokenmeter=warn"
    }
}

/// Initialize logging to stderr.
///
/// Reads `TOKENMETER_LOG` for per-module levels, e.g.
/// `TOKENMETER_LOG=tokenmeter::engine=debug,tokenmeter::scheduler=info`.
/// Stdout is left untouched so `count --json` and `serve` output stays parseable.
///
/// Calling this more than once is a no-op.
pub fn init_tracing(verbose: bool) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_thread_names(true),
            )
            .with(filter)
            .try_init();
    });
}
