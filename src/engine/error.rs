use thiserror::Error;

/// Failures surfaced by the token engine to its callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("token calculation timed out after {timeout_ms}ms for request {request_id}")]
    Timeout { request_id: String, timeout_ms: u64 },
    #[error("token engine was disposed before request completion")]
    Disposed,
    #[error("failed to post message to token worker: {0}")]
    DispatchFailure(String),
    #[error("token worker failed: {0}")]
    WorkerFault(String),
    #[error("token computation failed: {0}")]
    ComputeFailure(String),
    #[error("failed to start token worker: {0}")]
    Spawn(String),
}
