//! @dose
//! purpose: Turns heavy line ranges into clamped warning/critical line spans and prints them
//!     for the terminal.
//!
//! invariants:
//!     - Clamped spans always lie inside [0, line_count - 1] with start <= end
//!     - Ranges are partitioned by severity, never merged
//!
//! gotchas:
//!     - Line numbers are zero-based internally and one-based when printed

use crate::sink::HighlightSink;
use crate::types::{DocumentHandle, HeavyRange, Severity};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

/// Zero-based inclusive line span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub start_line: usize,
    pub end_line: usize,
}

/// Line spans to highlight, split by severity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightSet {
    pub warning: Vec<LineSpan>,
    pub critical: Vec<LineSpan>,
}

impl HighlightSet {
    pub fn is_empty(&self) -> bool {
        self.warning.is_empty() && self.critical.is_empty()
    }
}

/// Clamp ranges to a document of `line_count` lines and partition them by severity
pub fn clamp_ranges(ranges: &[HeavyRange], line_count: usize) -> HighlightSet {
    let max_line = line_count.saturating_sub(1);
    let mut set = HighlightSet::default();

    for range in ranges {
        let start_line = range.start_line.min(max_line);
        let end_line = range.end_line.min(max_line).max(start_line);
        let span = LineSpan {
            start_line,
            end_line,
        };
        match range.severity {
            Severity::Critical => set.critical.push(span),
            Severity::Warning => set.warning.push(span),
        }
    }

    set
}

/// One printable line per range, e.g. `L12 warning 180 tok`
pub fn render_ranges(ranges: &[HeavyRange]) -> Vec<String> {
    ranges
        .iter()
        .map(|range| {
            let lines = if range.start_line == range.end_line {
                format!("L{}", range.start_line + 1)
            } else {
                format!("L{}-L{}", range.start_line + 1, range.end_line + 1)
            };
            format!("{} {} {} tok", lines, range.severity.as_str(), range.tokens)
        })
        .collect()
}

/// Highlight sink that prints heavy lines for the terminal
pub struct TerminalHighlights<W: Write + Send> {
    out: Mutex<W>,
    line_counts: Mutex<HashMap<DocumentHandle, usize>>,
    shown: Mutex<HashMap<DocumentHandle, HighlightSet>>,
}

impl<W: Write + Send> TerminalHighlights<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            line_counts: Mutex::new(HashMap::new()),
            shown: Mutex::new(HashMap::new()),
        }
    }

    /// Record the current line count of a document so ranges can be clamped to it
    pub fn set_line_count(&self, document: &DocumentHandle, line_count: usize) {
        self.line_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document.clone(), line_count);
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear(&self, document: Option<&DocumentHandle>) {
        let mut shown = self.shown.lock().unwrap_or_else(PoisonError::into_inner);
        let had_highlights = match document {
            Some(document) => shown.remove(document).is_some(),
            None => {
                let had_any = !shown.is_empty();
                shown.clear();
                had_any
            }
        };
        if had_highlights {
            let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = writeln!(out, "  heavy lines cleared");
            let _ = out.flush();
        }
    }
}

impl<W: Write + Send> HighlightSink for TerminalHighlights<W> {
    fn update_highlights(&self, document: Option<&DocumentHandle>, ranges: Option<&[HeavyRange]>) {
        let (Some(document), Some(ranges)) = (document, ranges) else {
            return self.clear(document);
        };
        if ranges.is_empty() {
            return self.clear(Some(document));
        }

        let line_count = self
            .line_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(document)
            .copied()
            .unwrap_or(usize::MAX);
        let set = clamp_ranges(ranges, line_count);

        let mut shown = self.shown.lock().unwrap_or_else(PoisonError::into_inner);
        if shown.get(document) == Some(&set) {
            return;
        }

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(
            out,
            "  heavy lines in {}: {} warning, {} critical",
            document,
            set.warning.len(),
            set.critical.len()
        );
        for line in render_ranges(ranges) {
            let _ = writeln!(out, "    {}", line);
        }
        let _ = out.flush();
        shown.insert(document.clone(), set);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_partitions_by_severity() {
        let ranges = vec![
            HeavyRange::line(1, 200, Severity::Warning),
            HeavyRange::line(3, 500, Severity::Critical),
            HeavyRange::line(5, 160, Severity::Warning),
        ];
        let set = clamp_ranges(&ranges, 10);
        assert_eq!(
            set.warning,
            vec![
                LineSpan { start_line: 1, end_line: 1 },
                LineSpan { start_line: 5, end_line: 5 },
            ]
        );
        assert_eq!(set.critical, vec![LineSpan { start_line: 3, end_line: 3 }]);
    }

    #[test]
    fn test_clamp_out_of_range_lines() {
        let ranges = vec![HeavyRange {
            start_line: 8,
            end_line: 20,
            tokens: 300,
            severity: Severity::Warning,
        }];
        let set = clamp_ranges(&ranges, 5);
        assert_eq!(set.warning, vec![LineSpan { start_line: 4, end_line: 4 }]);

        // Empty document clamps everything to line 0
        let set = clamp_ranges(&ranges, 0);
        assert_eq!(set.warning, vec![LineSpan { start_line: 0, end_line: 0 }]);
    }

    #[test]
    fn test_render_ranges() {
        let ranges = vec![
            HeavyRange::line(0, 150, Severity::Warning),
            HeavyRange {
                start_line: 4,
                end_line: 6,
                tokens: 900,
                severity: Severity::Critical,
            },
        ];
        assert_eq!(
            render_ranges(&ranges),
            vec!["L1 warning 150 tok", "L5-L7 critical 900 tok"]
        );
    }

    #[test]
    fn test_terminal_highlights_print_and_clear() {
        let sink = TerminalHighlights::new(Vec::new());
        let doc = DocumentHandle::new("notes.md");
        sink.set_line_count(&doc, 3);

        let ranges = vec![HeavyRange::line(2, 420, Severity::Critical)];
        sink.update_highlights(Some(&doc), Some(&ranges));
        // Same highlights again: nothing new printed
        sink.update_highlights(Some(&doc), Some(&ranges));
        sink.update_highlights(Some(&doc), Some(&[]));
        // Already clear: nothing printed
        sink.update_highlights(None, None);

        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            output,
            "  heavy lines in notes.md: 0 warning, 1 critical\n    L3 critical 420 tok\n  heavy lines cleared\n"
        );
    }
}
