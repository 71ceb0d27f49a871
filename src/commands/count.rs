//! @dose
//! purpose: Implements the count command: one token count per file, either the instant
//!     chars/4 estimate or an exact whole-document encode with heavy-line diagnostics.
//!
//! when-editing:
//!     - !--fast never starts a worker
//!     - !The engine is initialized with an empty calculation before any file is counted
//!     - JSON output is one object per line on stdout; logs go to stderr
//!
//! flows:
//!     - Fast: read file -> estimate_fast -> print
//!     - Exact: start engine -> ensure_ready -> reconcile each file -> print -> dispose

use super::{build_runtime, relative_to};
use crate::cli::CountArgs;
use crate::config::{Config, ThresholdMatcher};
use crate::engine::TokenEngine;
use crate::sink::{render_ranges, StatusLine};
use crate::types::HeavyRange;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Count of one file as printed by `count`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCount {
    pub path: String,
    pub token_count: usize,
    pub is_exact: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heavy_ranges: Option<Vec<HeavyRange>>,
}

pub fn run_count(args: &CountArgs, root: &Path, config: &Config) -> Result<()> {
    let files: Vec<PathBuf> = args.paths.iter().map(|p| root.join(p)).collect();
    let matcher = config.threshold_matcher();

    if args.fast {
        for path in &files {
            let text = read_document(path)?;
            let count = FileCount {
                path: relative_to(path, root).display().to_string(),
                token_count: TokenEngine::estimate_fast(&text),
                is_exact: false,
                heavy_ranges: None,
            };
            print_count(&count, args.json, &matcher)?;
        }
        return Ok(());
    }

    let runtime = build_runtime()?;
    runtime.block_on(async {
        let engine = TokenEngine::start(config.encoding, config.engine_options())
            .context("failed to start token engine")?;
        engine
            .ensure_ready()
            .await
            .context("failed to initialize token engine")?;

        for path in &files {
            let text = read_document(path)?;
            let result = engine
                .calculate_tokens(text, true)
                .await
                .with_context(|| format!("Failed to count tokens in {}", path.display()))?;
            let count = FileCount {
                path: relative_to(path, root).display().to_string(),
                token_count: result.token_count,
                is_exact: result.is_reconciled,
                heavy_ranges: result.heavy_ranges,
            };
            print_count(&count, args.json, &matcher)?;
        }

        engine.dispose();
        Ok::<(), anyhow::Error>(())
    })
}

fn read_document(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_count(count: &FileCount, json: bool, matcher: &ThresholdMatcher) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(count)?);
        return Ok(());
    }
    for line in format_count(count, matcher) {
        println!("{}", line);
    }
    Ok(())
}

/// Human-readable lines for one file: the status line, then one line per heavy range
pub fn format_count(count: &FileCount, matcher: &ThresholdMatcher) -> Vec<String> {
    let thresholds = matcher.get_thresholds(Path::new(&count.path));
    let status = StatusLine::render(count.token_count, count.is_exact, &thresholds);

    let mut lines = vec![format!("{}: {}", count.path, status.text)];
    if let Some(ranges) = count.heavy_ranges.as_deref() {
        lines.extend(render_ranges(ranges).into_iter().map(|r| format!("  {}", r)));
    }
    lines
}
