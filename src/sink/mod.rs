//! @dose
//! purpose: Presentation sinks the update scheduler pushes into, plus the terminal renderings
//!     used by the watch and count commands.
//!
//! when-editing:
//!     - !Sinks are called from scheduler tasks; implementations must be Send + Sync and fast
//!     - Sinks never see stale data; staleness is filtered before they are called
//!
//! gotchas:
//!     - update_highlights(None, _) means there is no active document: clear everything

mod highlights;
mod status;

use crate::types::{DocumentHandle, HeavyRange};

pub use highlights::{clamp_ranges, render_ranges, HighlightSet, LineSpan, TerminalHighlights};
pub use status::{
    format_token_count, IndicatorThresholds, StatusLevel, StatusLine, TerminalIndicator,
    DEFAULT_CRITICAL_THRESHOLD, DEFAULT_WARNING_THRESHOLD,
};

/// Receives the token count to display
pub trait IndicatorSink: Send + Sync {
    fn update(&self, token_count: usize, is_exact: bool);
}

/// Receives the heavy line ranges of a document; None or empty clears them
pub trait HighlightSink: Send + Sync {
    fn update_highlights(&self, document: Option<&DocumentHandle>, ranges: Option<&[HeavyRange]>);
}
