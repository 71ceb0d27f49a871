mod count;
mod serve;
mod watch;

pub use count::*;
pub use serve::*;
pub use watch::*;

use anyhow::{Context, Result};
use std::path::Path;
use tokio::runtime::{Builder, Runtime};

/// Single-threaded runtime the scheduler, broker and timers all run on
fn build_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

/// Path relative to root for threshold matching and display
fn relative_to<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}
