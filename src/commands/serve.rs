//! @dose
//! purpose: Implements the serve command, which exposes the tokenization worker over stdio so
//!     another process can drive it: one JSON request per input line, one JSON response per
//!     output line.
//!
//! when-editing:
//!     - !Malformed lines (bad JSON or a bad request shape) get no response at all
//!     - Responses are flushed per line so the peer never waits on buffering
//!
//! invariants:
//!     - Requests are answered strictly in input order
//!     - The chunk cache lives for the whole session

use crate::config::Config;
use crate::engine::{Encoder, TiktokenEncoder, TokenWorker};
use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use tracing::{debug, info};

pub fn run_serve(config: &Config) -> Result<()> {
    let encoder =
        TiktokenEncoder::new(config.encoding).context("failed to initialize token engine")?;
    let mut worker = TokenWorker::new(encoder, config.worker_options());
    info!(encoding = %config.encoding, "serving token requests on stdio");

    let stdin = io::stdin();
    let stdout = io::stdout();
    serve_lines(&mut worker, stdin.lock(), stdout.lock())
}

/// Answer every well-formed request line from `input` on `output` until EOF
pub fn serve_lines<E, R, W>(worker: &mut TokenWorker<E>, input: R, mut output: W) -> Result<()>
where
    E: Encoder,
    R: BufRead,
    W: Write,
{
    for line in input.lines() {
        let line = line.context("Failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }
        let message: Value = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                debug!("ignoring unparsable request line: {}", e);
                continue;
            }
        };
        let Some(response) = worker.handle_message(message) else {
            continue;
        };
        writeln!(output, "{}", response).context("Failed to write response")?;
        output.flush().context("Failed to write response")?;
    }
    Ok(())
}
