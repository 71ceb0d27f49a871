//! @dose
//! purpose: Three-tier update pipeline for the active document. Every change shows an instant
//!     estimate, then a debounced approximate count, then a debounced exact count with heavy
//!     line diagnostics, and never lets a superseded result overwrite a newer one.
//!
//! when-editing:
//!     - !Every triggering event bumps the sequence counter; a tier applies its result only if
//!       the counter still holds the value captured when it was scheduled
//!     - !The staleness check and the sink push happen under the same lock as the bump
//!     - !Tier 2 and tier 3 failures are logged and dropped, never surfaced
//!     - Superseded requests are not cancelled in the worker; their results are discarded
//!
//! invariants:
//!     - At most one armed approximate timer and one armed reconcile timer
//!     - Tier 1 always reflects the latest text
//!     - After clear() or teardown() nothing scheduled earlier can reach the sinks
//!
//! flows:
//!     - Change: bump -> estimate -> arm tier 2 (300ms) -> arm tier 3 (2000ms)
//!     - Tier fires: calculate_tokens -> check sequence -> push to sinks
//!     - No active document: cancel timers, bump, zero the indicator, clear highlights

mod debounce;

pub use debounce::DebounceSlot;

use crate::engine::{EngineError, TokenEngine};
use crate::sink::{HighlightSink, IndicatorSink};
use crate::types::DocumentHandle;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_APPROXIMATE_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_RECONCILE_DELAY: Duration = Duration::from_millis(2000);

/// Quiet periods before the approximate and reconcile tiers run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTimings {
    pub approximate_delay: Duration,
    pub reconcile_delay: Duration,
}

impl Default for ScheduleTimings {
    fn default() -> Self {
        Self {
            approximate_delay: DEFAULT_APPROXIMATE_DELAY,
            reconcile_delay: DEFAULT_RECONCILE_DELAY,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared pieces a tier task needs after the scheduler has moved on
#[derive(Clone)]
struct TierContext {
    engine: Arc<TokenEngine>,
    indicator: Arc<dyn IndicatorSink>,
    highlights: Arc<dyn HighlightSink>,
    sequence: Arc<Mutex<u64>>,
}

pub struct UpdateScheduler {
    context: TierContext,
    timings: ScheduleTimings,
    approximate: DebounceSlot,
    reconcile: DebounceSlot,
    active: Option<DocumentHandle>,
}

impl UpdateScheduler {
    pub fn new(
        engine: Arc<TokenEngine>,
        indicator: Arc<dyn IndicatorSink>,
        highlights: Arc<dyn HighlightSink>,
        timings: ScheduleTimings,
    ) -> Self {
        Self {
            context: TierContext {
                engine,
                indicator,
                highlights,
                sequence: Arc::new(Mutex::new(0)),
            },
            timings,
            approximate: DebounceSlot::new(),
            reconcile: DebounceSlot::new(),
            active: None,
        }
    }

    /// Verify the engine with a first calculation, then build the scheduler.
    ///
    /// On failure the engine is disposed and the error returned; nothing is left half-running.
    pub async fn init(
        engine: TokenEngine,
        indicator: Arc<dyn IndicatorSink>,
        highlights: Arc<dyn HighlightSink>,
        timings: ScheduleTimings,
    ) -> Result<Self, EngineError> {
        engine.ensure_ready().await?;
        Ok(Self::new(Arc::new(engine), indicator, highlights, timings))
    }

    /// Current value of the update sequence counter
    pub fn current_sequence(&self) -> u64 {
        *lock(&self.context.sequence)
    }

    pub fn active_document(&self) -> Option<&DocumentHandle> {
        self.active.as_ref()
    }

    pub fn engine(&self) -> &Arc<TokenEngine> {
        &self.context.engine
    }

    /// React to a new snapshot of `document`: activation, switch, or edit
    pub fn schedule_update(&mut self, document: DocumentHandle, text: impl Into<Arc<str>>) {
        let text: Arc<str> = text.into();

        if let Some(previous) = self.active.take() {
            if previous != document {
                self.context.highlights.update_highlights(Some(&previous), None);
            }
        }
        self.active = Some(document.clone());

        let my_seq = {
            let mut sequence = lock(&self.context.sequence);
            *sequence += 1;
            self.context
                .indicator
                .update(TokenEngine::estimate_fast(&text), false);
            *sequence
        };

        let context = self.context.clone();
        let approximate_text = Arc::clone(&text);
        self.approximate.arm(self.timings.approximate_delay, async move {
            context.run_approximate(my_seq, approximate_text).await;
        });

        let context = self.context.clone();
        self.reconcile.arm(self.timings.reconcile_delay, async move {
            context.run_reconcile(my_seq, document, text).await;
        });
    }

    /// No active document: drop pending tiers and reset the sinks
    pub fn clear(&mut self) {
        self.approximate.cancel();
        self.reconcile.cancel();
        self.active = None;

        let mut sequence = lock(&self.context.sequence);
        *sequence += 1;
        self.context.indicator.update(0, true);
        self.context.highlights.update_highlights(None, None);
    }

    /// Stop everything and dispose the engine
    pub fn teardown(&mut self) {
        self.approximate.cancel();
        self.reconcile.cancel();
        *lock(&self.context.sequence) += 1;
        self.context.engine.dispose();
        info!("update scheduler torn down");
    }
}

impl TierContext {
    async fn run_approximate(&self, my_seq: u64, text: Arc<str>) {
        match self.engine.calculate_tokens(text.as_ref(), false).await {
            Ok(result) => {
                let sequence = lock(&self.sequence);
                if *sequence != my_seq {
                    debug!(my_seq, current = *sequence, "discarded stale approximate count");
                    return;
                }
                self.indicator.update(result.token_count, result.is_reconciled);
            }
            Err(e) => log_tier_failure("approximate", &e),
        }
    }

    async fn run_reconcile(&self, my_seq: u64, document: DocumentHandle, text: Arc<str>) {
        match self.engine.calculate_tokens(text.as_ref(), true).await {
            Ok(result) => {
                let sequence = lock(&self.sequence);
                if *sequence != my_seq {
                    debug!(my_seq, current = *sequence, "discarded stale reconcile count");
                    return;
                }
                self.indicator.update(result.token_count, true);
                self.highlights
                    .update_highlights(Some(&document), result.heavy_ranges.as_deref());
            }
            Err(e) => log_tier_failure("reconcile", &e),
        }
    }
}

fn log_tier_failure(tier: &str, error: &EngineError) {
    match error {
        EngineError::Disposed => debug!(tier, "token pass abandoned: engine disposed"),
        _ => warn!(tier, error = %error, "token pass failed"),
    }
}
