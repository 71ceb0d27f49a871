//! @dose
//! purpose: The tokenization worker. Owns the encoder and the chunk cache, answers one request at
//!     a time, and runs on its own OS thread reachable only through the untyped message channel.
//!
//! when-editing:
//!     - !Reconcile requests and short documents always take the whole-document path
//!     - !Every whole-document encode clears the chunk cache
//!     - !Encoder errors and panics become tokenize:error responses; they never end the thread
//!
//! invariants:
//!     - Requests are handled strictly in arrival order; the cache has a single owner
//!     - Malformed inbound messages produce no response at all
//!     - Heavy ranges are only computed for reconcile requests, one range per flagged line
//!
//! gotchas:
//!     - Document length is measured in chars, not bytes
//!     - The chunked count can differ slightly from a whole-document encode when a BPE merge
//!       would span a chunk boundary; the next reconcile pass corrects it
//!
//! flows:
//!     - Spawn: build encoder on the worker thread, then loop on blocking_recv until the
//!       request sender is dropped
//!     - Request: validate, tokenize (exact or chunked), optionally scan lines, respond

use crate::engine::chunk::split_into_line_chunks;
use crate::engine::encoder::Encoder;
use crate::engine::error::EngineError;
use crate::engine::hash::hash_chunk;
use crate::types::{HeavyRange, Severity, TokenizeResult, WorkerRequest, WorkerResponse};
use anyhow::Result;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error};

pub const DEFAULT_FULL_ENCODE_THRESHOLD: usize = 50_000;
pub const DEFAULT_CHUNK_LINES: usize = 500;
pub const DEFAULT_HEAVY_WARNING_TOKENS: usize = 150;
pub const DEFAULT_HEAVY_CRITICAL_TOKENS: usize = 400;

/// Tuning knobs for the worker's tokenization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Documents shorter than this many chars are always encoded whole
    pub full_encode_threshold: usize,
    /// Lines per cached chunk on the incremental path
    pub chunk_lines: usize,
    /// Single-line token count flagged as a warning
    pub heavy_warning_tokens: usize,
    /// Single-line token count flagged as critical
    pub heavy_critical_tokens: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            full_encode_threshold: DEFAULT_FULL_ENCODE_THRESHOLD,
            chunk_lines: DEFAULT_CHUNK_LINES,
            heavy_warning_tokens: DEFAULT_HEAVY_WARNING_TOKENS,
            heavy_critical_tokens: DEFAULT_HEAVY_CRITICAL_TOKENS,
        }
    }
}

/// Both halves of the untyped channel between an engine and its worker
pub struct WorkerTransport {
    pub requests: UnboundedSender<Value>,
    pub responses: UnboundedReceiver<Value>,
}

pub struct TokenWorker<E: Encoder> {
    encoder: E,
    options: WorkerOptions,
    chunk_cache: HashMap<u32, usize>,
}

impl<E: Encoder> TokenWorker<E> {
    pub fn new(encoder: E, options: WorkerOptions) -> Self {
        Self {
            encoder,
            options,
            chunk_cache: HashMap::new(),
        }
    }

    /// Number of chunk counts currently cached
    pub fn cached_chunks(&self) -> usize {
        self.chunk_cache.len()
    }

    /// Validate and answer one untyped message. Malformed input yields None.
    pub fn handle_message(&mut self, message: Value) -> Option<Value> {
        let Some(request) = WorkerRequest::from_message(message) else {
            debug!("token worker ignored malformed message");
            return None;
        };
        Some(self.handle(request).into_message())
    }

    pub fn handle(&mut self, request: WorkerRequest) -> WorkerResponse {
        let WorkerRequest::Tokenize {
            request_id,
            text,
            is_reconcile_request,
        } = request;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.tokenize(&text, is_reconcile_request)
        }));

        match outcome {
            Ok(Ok((token_count, is_reconciled, heavy_ranges))) => {
                WorkerResponse::Result(TokenizeResult {
                    request_id,
                    token_count,
                    is_reconciled,
                    is_estimate: false,
                    heavy_ranges,
                })
            }
            Ok(Err(e)) => WorkerResponse::Error {
                request_id,
                error: format!("{:#}", e),
            },
            Err(payload) => WorkerResponse::Error {
                request_id,
                error: panic_message(&*payload),
            },
        }
    }

    fn tokenize(
        &mut self,
        text: &str,
        is_reconcile_request: bool,
    ) -> Result<(usize, bool, Option<Vec<HeavyRange>>)> {
        let use_full_encode =
            is_reconcile_request || text.chars().count() < self.options.full_encode_threshold;

        if use_full_encode {
            let token_count = self.encoder.count_tokens(text)?;
            self.chunk_cache.clear();

            let heavy_ranges = if is_reconcile_request {
                Some(self.scan_heavy_ranges(text)?)
            } else {
                None
            };
            return Ok((token_count, true, heavy_ranges));
        }

        let mut token_count = 0;
        for chunk in split_into_line_chunks(text, self.options.chunk_lines) {
            let key = hash_chunk(chunk);
            if let Some(cached) = self.chunk_cache.get(&key) {
                token_count += cached;
                continue;
            }
            let computed = self.encoder.count_tokens(chunk)?;
            self.chunk_cache.insert(key, computed);
            token_count += computed;
        }

        Ok((token_count, false, None))
    }

    /// Encode each non-blank line on its own and flag the heavy ones
    pub fn scan_heavy_ranges(&self, text: &str) -> Result<Vec<HeavyRange>> {
        let mut ranges = Vec::new();

        for (line_index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let tokens = self.encoder.count_tokens(line)?;
            let severity = if tokens >= self.options.heavy_critical_tokens {
                Severity::Critical
            } else if tokens >= self.options.heavy_warning_tokens {
                Severity::Warning
            } else {
                continue;
            };
            ranges.push(HeavyRange::line(line_index, tokens, severity));
        }

        Ok(ranges)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("encoder panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("encoder panicked: {}", message)
    } else {
        "Unknown tokenization error.".to_string()
    }
}

/// Start a worker thread and return the channel pair that reaches it.
///
/// The encoder is built on the worker thread. If that fails the thread exits immediately,
/// which the engine observes as an unexpected worker exit.
pub fn spawn_worker<E, F>(options: WorkerOptions, make_encoder: F) -> Result<WorkerTransport, EngineError>
where
    E: Encoder + 'static,
    F: FnOnce() -> Result<E> + Send + 'static,
{
    let (request_tx, mut request_rx) = mpsc::unbounded_channel::<Value>();
    let (response_tx, response_rx) = mpsc::unbounded_channel::<Value>();

    thread::Builder::new()
        .name("tokenmeter-worker".to_string())
        .spawn(move || {
            let encoder = match make_encoder() {
                Ok(encoder) => encoder,
                Err(e) => {
                    error!("token worker failed to build encoder: {:#}", e);
                    return;
                }
            };
            let mut worker = TokenWorker::new(encoder, options);

            while let Some(message) = request_rx.blocking_recv() {
                let Some(response) = worker.handle_message(message) else {
                    continue;
                };
                if response_tx.send(response).is_err() {
                    break;
                }
            }
            debug!("token worker stopped");
        })
        .map_err(|e| EngineError::Spawn(e.to_string()))?;

    Ok(WorkerTransport {
        requests: request_tx,
        responses: response_rx,
    })
}
