//! @dose
//! purpose: Renders a token count as a one-line status indicator with warning/critical levels,
//!     and a terminal sink that prints it whenever the rendered text changes.
//!
//! invariants:
//!     - Counts below 1,000 print in full; larger counts print compact with a k/m/b suffix
//!     - A count that is not exact is prefixed with ~
//!
//! gotchas:
//!     - 999_999 renders as "1000k": the suffix is picked before rounding

use crate::sink::IndicatorSink;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

pub const DEFAULT_WARNING_THRESHOLD: usize = 4_000;
pub const DEFAULT_CRITICAL_THRESHOLD: usize = 8_000;

/// Indicator thresholds for one document (None = level disabled)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorThresholds {
    pub warning: Option<usize>,
    pub critical: Option<usize>,
}

impl Default for IndicatorThresholds {
    fn default() -> Self {
        Self {
            warning: Some(DEFAULT_WARNING_THRESHOLD),
            critical: Some(DEFAULT_CRITICAL_THRESHOLD),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Normal,
    Warning,
    Critical,
}

impl StatusLevel {
    pub fn for_count(token_count: usize, thresholds: &IndicatorThresholds) -> Self {
        if thresholds.critical.is_some_and(|limit| token_count >= limit) {
            StatusLevel::Critical
        } else if thresholds.warning.is_some_and(|limit| token_count >= limit) {
            StatusLevel::Warning
        } else {
            StatusLevel::Normal
        }
    }

    fn marker(&self) -> &'static str {
        match self {
            StatusLevel::Normal => "[tok]",
            StatusLevel::Warning => "[warn]",
            StatusLevel::Critical => "[crit]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub level: StatusLevel,
}

impl StatusLine {
    pub fn render(token_count: usize, is_exact: bool, thresholds: &IndicatorThresholds) -> Self {
        let level = StatusLevel::for_count(token_count, thresholds);
        let prefix = if is_exact { "" } else { "~" };
        Self {
            text: format!(
                "{} {}{} tok",
                level.marker(),
                prefix,
                format_token_count(token_count)
            ),
            level,
        }
    }
}

/// Format a count for display: plain below 1,000, otherwise compact (1.5k, 12.3k, 2m)
pub fn format_token_count(token_count: usize) -> String {
    const SCALES: [(f64, &str); 3] = [(1e9, "b"), (1e6, "m"), (1e3, "k")];

    if token_count < 1_000 {
        return token_count.to_string();
    }

    let count = token_count as f64;
    let (divisor, suffix) = SCALES
        .iter()
        .copied()
        .find(|(divisor, _)| count >= *divisor)
        .unwrap_or((1e3, "k"));
    format_compact(count / divisor, suffix)
}

fn format_compact(value: f64, suffix: &str) -> String {
    let decimals = if value >= 100.0 {
        0
    } else if value >= 10.0 {
        1
    } else {
        2
    };
    let mut rounded = format!("{:.*}", decimals, value);
    if rounded.contains('.') {
        rounded = rounded.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    format!("{}{}", rounded, suffix)
}

/// Indicator that writes the status line to a terminal stream
pub struct TerminalIndicator<W: Write + Send> {
    out: Mutex<W>,
    thresholds: Mutex<IndicatorThresholds>,
    last_text: Mutex<Option<String>>,
}

impl<W: Write + Send> TerminalIndicator<W> {
    pub fn new(out: W, thresholds: IndicatorThresholds) -> Self {
        Self {
            out: Mutex::new(out),
            thresholds: Mutex::new(thresholds),
            last_text: Mutex::new(None),
        }
    }

    /// Switch thresholds, e.g. when a different document becomes active
    pub fn set_thresholds(&self, thresholds: IndicatorThresholds) {
        *self.thresholds.lock().unwrap_or_else(PoisonError::into_inner) = thresholds;
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> IndicatorSink for TerminalIndicator<W> {
    fn update(&self, token_count: usize, is_exact: bool) {
        let thresholds = *self.thresholds.lock().unwrap_or_else(PoisonError::into_inner);
        let line = StatusLine::render(token_count, is_exact, &thresholds);

        let mut last_text = self.last_text.lock().unwrap_or_else(PoisonError::into_inner);
        if last_text.as_deref() == Some(line.text.as_str()) {
            return;
        }

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{}", line.text);
        let _ = out.flush();
        *last_text = Some(line.text);
    }
}
