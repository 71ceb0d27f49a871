//! @dose
//! purpose: TokenEngine, the request broker in front of the tokenization worker. Assigns request
//!     ids, keeps the pending-request map, enforces per-request timeouts and settles every caller
//!     exactly once: with the worker's result, a timeout, a dispatch failure, a worker fault, or
//!     disposal.
//!
//! when-editing:
//!     - !The pending map is the single source of truth for awaited requests
//!     - !Every path that settles a request removes its entry first; whoever removes it wins
//!     - !The disposed flag is only flipped while holding the pending lock, so no entry can be
//!       registered after dispose() has drained the map
//!     - Construction needs a running Tokio runtime (listener and timeout tasks are spawned on it)
//!
//! invariants:
//!     - At most one entry per request id
//!     - A response with no matching entry (late, duplicate, unknown) is dropped silently
//!     - Timeout and DispatchFailure stay distinct error kinds
//!     - The worker is never restarted; a faulted engine keeps failing until replaced
//!
//! gotchas:
//!     - Dropping the request sender is how the worker is terminated; it finishes its current
//!       request first and any response it sends afterwards is ignored
//!     - Dropping a TokenEngine disposes it

use crate::engine::encoder::{EncodingName, TiktokenEncoder};
use crate::engine::error::EngineError;
use crate::engine::worker::{spawn_worker, WorkerOptions, WorkerTransport};
use crate::types::{TokenizeResult, WorkerRequest, WorkerResponse};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub request_timeout: Duration,
    pub worker: WorkerOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            worker: WorkerOptions::default(),
        }
    }
}

type Reply = oneshot::Sender<Result<TokenizeResult, EngineError>>;

struct PendingRequest {
    reply: Reply,
    timeout: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingRequest>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct TokenEngine {
    requests: Mutex<Option<UnboundedSender<Value>>>,
    pending: PendingMap,
    disposed: Arc<AtomicBool>,
    request_timeout: Duration,
    listener: JoinHandle<()>,
}

impl TokenEngine {
    /// Start a tiktoken-backed worker thread and a broker in front of it
    pub fn start(encoding: EncodingName, options: EngineOptions) -> Result<Self, EngineError> {
        let transport = spawn_worker(options.worker, move || TiktokenEncoder::new(encoding))?;
        let engine = Self::with_transport(transport, options.request_timeout)?;
        info!(%encoding, "token engine started");
        Ok(engine)
    }

    /// Build a broker over an existing transport
    pub fn with_transport(
        transport: WorkerTransport,
        request_timeout: Duration,
    ) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::Spawn(format!("no Tokio runtime available: {}", e)))?;

        let WorkerTransport {
            requests,
            responses,
        } = transport;
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let disposed = Arc::new(AtomicBool::new(false));

        let listener = runtime.spawn(listen(
            responses,
            Arc::clone(&pending),
            Arc::clone(&disposed),
        ));

        Ok(Self {
            requests: Mutex::new(Some(requests)),
            pending,
            disposed,
            request_timeout,
            listener,
        })
    }

    /// Instant approximation: one token per four characters, rounded up
    pub fn estimate_fast(text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }

    /// Ask the worker for a token count.
    ///
    /// `is_reconcile_request` forces a whole-document encode and a heavy-line scan.
    pub async fn calculate_tokens(
        &self,
        text: impl Into<String>,
        is_reconcile_request: bool,
    ) -> Result<TokenizeResult, EngineError> {
        let receiver = self.dispatch(text.into(), is_reconcile_request)?;
        // A dropped sender means the entry was discarded without a verdict
        receiver.await.unwrap_or(Err(EngineError::Disposed))
    }

    /// Run the first calculation. On failure the engine is disposed and the error returned.
    pub async fn ensure_ready(&self) -> Result<(), EngineError> {
        match self.calculate_tokens("", false).await {
            Ok(_) => {
                info!("token engine initialized");
                Ok(())
            }
            Err(e) => {
                self.dispose();
                Err(e)
            }
        }
    }

    fn dispatch(
        &self,
        text: String,
        is_reconcile_request: bool,
    ) -> Result<oneshot::Receiver<Result<TokenizeResult, EngineError>>, EngineError> {
        let request_id = Uuid::new_v4().to_string();
        let (reply, receiver) = oneshot::channel();

        {
            let mut pending = lock(&self.pending);
            if self.disposed.load(Ordering::SeqCst) {
                return Err(EngineError::Disposed);
            }
            let timeout = self.spawn_timeout(request_id.clone());
            pending.insert(request_id.clone(), PendingRequest { reply, timeout });
        }

        let message =
            WorkerRequest::tokenize(request_id.clone(), text, is_reconcile_request).into_message();
        let sent = match lock(&self.requests).as_ref() {
            Some(sender) => sender
                .send(message)
                .map_err(|_| "token worker is no longer running".to_string()),
            None => Err("token worker was terminated".to_string()),
        };

        if let Err(reason) = sent {
            if let Some(entry) = lock(&self.pending).remove(&request_id) {
                entry.timeout.abort();
            }
            if self.disposed.load(Ordering::SeqCst) {
                return Err(EngineError::Disposed);
            }
            return Err(EngineError::DispatchFailure(reason));
        }

        debug!(%request_id, is_reconcile_request, "dispatched token request");
        Ok(receiver)
    }

    fn spawn_timeout(&self, request_id: String) -> JoinHandle<()> {
        let pending = Arc::clone(&self.pending);
        let timeout = self.request_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(entry) = lock(&pending).remove(&request_id) else {
                return;
            };
            warn!(%request_id, timeout_ms = timeout.as_millis() as u64, "token request timed out");
            let _ = entry.reply.send(Err(EngineError::Timeout {
                request_id,
                timeout_ms: timeout.as_millis() as u64,
            }));
        })
    }

    /// Reject everything still pending, terminate the worker. Safe to call more than once.
    pub fn dispose(&self) {
        {
            let mut pending = lock(&self.pending);
            if self.disposed.swap(true, Ordering::SeqCst) {
                return;
            }
            reject_all(&mut pending, &EngineError::Disposed);
        }

        lock(&self.requests).take();
        self.listener.abort();
        info!("token engine disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Number of requests still awaiting a response
    pub fn pending_requests(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl Drop for TokenEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn reject_all(pending: &mut HashMap<String, PendingRequest>, error: &EngineError) {
    for (_, entry) in pending.drain() {
        entry.timeout.abort();
        let _ = entry.reply.send(Err(error.clone()));
    }
}

async fn listen(
    mut responses: UnboundedReceiver<Value>,
    pending: PendingMap,
    disposed: Arc<AtomicBool>,
) {
    while let Some(message) = responses.recv().await {
        let Some(response) = WorkerResponse::from_message(message) else {
            debug!("ignored malformed message from token worker");
            continue;
        };

        let Some(entry) = lock(&pending).remove(response.request_id()) else {
            debug!(
                request_id = response.request_id(),
                "dropped response with no pending request"
            );
            continue;
        };
        entry.timeout.abort();

        let outcome = match response {
            WorkerResponse::Result(result) => Ok(result),
            WorkerResponse::Error { error, .. } => Err(EngineError::ComputeFailure(error)),
        };
        let _ = entry.reply.send(outcome);
    }

    let mut entries = lock(&pending);
    if !disposed.load(Ordering::SeqCst) {
        warn!("token worker exited unexpectedly");
        reject_all(
            &mut entries,
            &EngineError::WorkerFault("token worker exited unexpectedly".to_string()),
        );
    }
}
