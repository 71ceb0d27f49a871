//! @dose
//! purpose: Implements the watch command that monitors files for changes and keeps a live token
//!     count for whichever one changed most recently, using the three-tier update scheduler.
//!
//! when-editing:
//!     - !The engine must pass its initialization check before watching starts
//!     - !Ctrl+C tears the scheduler down, which disposes the engine and stops the worker
//!     - Uses notify crate for cross-platform file system watching
//!
//! invariants:
//!     - The most recently changed watched file is the active document
//!     - A removed or unreadable active file clears the indicator and highlights
//!     - Events for files outside the watched set are ignored
//!
//! flows:
//!     - Initial: start engine, init scheduler, activate the first path
//!     - Watch: notify event -> classify -> schedule_update or clear
//!
//! gotchas:
//!     - Parent directories are watched rather than the files themselves, so editors that save
//!       by rename keep being tracked

use super::{build_runtime, relative_to};
use crate::cli::WatchArgs;
use crate::config::{Config, ThresholdMatcher};
use crate::engine::TokenEngine;
use crate::scheduler::{ScheduleTimings, UpdateScheduler};
use crate::sink::{IndicatorThresholds, TerminalHighlights, TerminalIndicator};
use crate::types::DocumentHandle;
use anyhow::{bail, Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// The kind of change detected for a watched file
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum FileChange {
    Changed,
    Removed,
}

pub fn run_watch(args: &WatchArgs, root: &Path, config: &Config) -> Result<()> {
    let timings = watch_timings(args, config);

    let mut files = Vec::new();
    for path in &args.paths {
        let path = root.join(path);
        if !path.is_file() {
            bail!("Not a file: {}", path.display());
        }
        let canonical = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        files.push(canonical);
    }

    let runtime = build_runtime()?;
    runtime.block_on(watch_files(files, root, config, timings))
}

/// Debounce delays: CLI flags first, then tokenmeter.toml
pub fn watch_timings(args: &WatchArgs, config: &Config) -> ScheduleTimings {
    let configured = config.schedule_timings();
    ScheduleTimings {
        approximate_delay: args
            .approximate_delay
            .map(Duration::from_millis)
            .unwrap_or(configured.approximate_delay),
        reconcile_delay: args
            .reconcile_delay
            .map(Duration::from_millis)
            .unwrap_or(configured.reconcile_delay),
    }
}

/// Turn a notify event into changes of watched files
pub fn classify_event(event: &Event, watched: &HashSet<PathBuf>) -> Vec<(PathBuf, FileChange)> {
    let change = match event.kind {
        EventKind::Access(_) => return Vec::new(),
        EventKind::Remove(_) => FileChange::Removed,
        _ => FileChange::Changed,
    };
    event
        .paths
        .iter()
        .filter(|path| watched.contains(*path))
        .map(|path| (path.clone(), change))
        .collect()
}

struct WatchSession<'a> {
    root: &'a Path,
    matcher: ThresholdMatcher,
    indicator: Arc<TerminalIndicator<Stdout>>,
    highlights: Arc<TerminalHighlights<Stdout>>,
    scheduler: UpdateScheduler,
}

impl WatchSession<'_> {
    fn activate(&mut self, path: &Path) {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %path.display(), "watched file unreadable: {}", e);
                return self.deactivate(path);
            }
        };

        let document = DocumentHandle::from_path(path);
        if self.scheduler.active_document() != Some(&document) {
            println!("==> {}", relative_to(path, self.root).display());
            self.indicator
                .set_thresholds(self.matcher.get_thresholds(relative_to(path, self.root)));
        }
        self.highlights
            .set_line_count(&document, text.lines().count());
        self.scheduler.schedule_update(document, text);
    }

    fn deactivate(&mut self, path: &Path) {
        let document = DocumentHandle::from_path(path);
        if self.scheduler.active_document() == Some(&document) {
            println!("==> {} removed", relative_to(path, self.root).display());
            self.scheduler.clear();
        }
    }

    fn apply(&mut self, path: &Path, change: FileChange) {
        match change {
            FileChange::Changed => self.activate(path),
            FileChange::Removed => self.deactivate(path),
        }
    }
}

async fn watch_files(
    files: Vec<PathBuf>,
    root: &Path,
    config: &Config,
    timings: ScheduleTimings,
) -> Result<()> {
    let indicator = Arc::new(TerminalIndicator::new(
        io::stdout(),
        IndicatorThresholds::default(),
    ));
    let highlights = Arc::new(TerminalHighlights::new(io::stdout()));

    let engine = TokenEngine::start(config.encoding, config.engine_options())
        .context("failed to start token engine")?;
    let scheduler = UpdateScheduler::init(engine, indicator.clone(), highlights.clone(), timings)
        .await
        .context("failed to initialize token engine")?;

    let mut session = WatchSession {
        root,
        matcher: config.threshold_matcher(),
        indicator,
        highlights,
        scheduler,
    };

    // Set up file watcher
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default(),
    )?;

    let directories: HashSet<PathBuf> = files
        .iter()
        .filter_map(|file| file.parent().map(Path::to_path_buf))
        .collect();
    for directory in &directories {
        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", directory.display()))?;
        debug!(directory = %directory.display(), "watching directory");
    }
    let watched: HashSet<PathBuf> = files.iter().cloned().collect();

    if let Some(first) = files.first() {
        session.activate(first);
    }
    info!(files = watched.len(), "watching for changes");
    eprintln!("Watching for changes... (press Ctrl+C to stop)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = rx.recv() => {
                let Some(event) = event else {
                    eprintln!("Watcher disconnected");
                    break;
                };
                for (path, change) in classify_event(&event, &watched) {
                    session.apply(&path, change);
                }
            }
        }
    }

    drop(watcher);
    session.scheduler.teardown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind, RemoveKind};

    fn watched() -> HashSet<PathBuf> {
        [PathBuf::from("/work/notes.md")].into_iter().collect()
    }

    #[test]
    fn test_classify_modify_and_create() {
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/work/notes.md"));
        assert_eq!(
            classify_event(&event, &watched()),
            vec![(PathBuf::from("/work/notes.md"), FileChange::Changed)]
        );

        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/work/notes.md"));
        assert_eq!(
            classify_event(&event, &watched()),
            vec![(PathBuf::from("/work/notes.md"), FileChange::Changed)]
        );
    }

    #[test]
    fn test_classify_remove() {
        let event = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/work/notes.md"));
        assert_eq!(
            classify_event(&event, &watched()),
            vec![(PathBuf::from("/work/notes.md"), FileChange::Removed)]
        );
    }

    #[test]
    fn test_classify_ignores_unwatched_and_access() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/work/other.md"));
        assert!(classify_event(&event, &watched()).is_empty());

        let event = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/work/notes.md"));
        assert!(classify_event(&event, &watched()).is_empty());
    }

    #[test]
    fn test_watch_timings_prefer_flags() {
        let config = Config::default();
        let args = WatchArgs {
            paths: vec![PathBuf::from("a.md")],
            approximate_delay: Some(50),
            reconcile_delay: None,
        };
        let timings = watch_timings(&args, &config);
        assert_eq!(timings.approximate_delay, Duration::from_millis(50));
        assert_eq!(timings.reconcile_delay, Duration::from_millis(2_000));
    }
}
