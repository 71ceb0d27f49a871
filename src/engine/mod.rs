//! @dose
//! purpose: Token engine: the request broker, the tokenization worker it fronts, and the
//!     hashing/chunking utilities the worker caches with.
//!
//! flows:
//!     - Caller -> TokenEngine::calculate_tokens -> untyped message -> worker thread
//!     - Worker -> untyped response -> listener task -> pending entry -> caller

mod broker;
mod chunk;
mod encoder;
mod error;
mod hash;
mod worker;

pub use broker::{EngineOptions, TokenEngine, DEFAULT_REQUEST_TIMEOUT};
pub use chunk::split_into_line_chunks;
pub use encoder::{Encoder, EncodingName, TiktokenEncoder};
pub use error::EngineError;
pub use hash::hash_chunk;
pub use worker::{
    spawn_worker, TokenWorker, WorkerOptions, WorkerTransport, DEFAULT_CHUNK_LINES,
    DEFAULT_FULL_ENCODE_THRESHOLD, DEFAULT_HEAVY_CRITICAL_TOKENS, DEFAULT_HEAVY_WARNING_TOKENS,
};
