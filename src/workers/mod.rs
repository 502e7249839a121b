//! Worker loop scaffolding shared by every stage: loop pacing options, the
//! in-memory temporary-ban map, and small path helpers.

pub mod cleanup;
pub mod difficulty;
pub mod download;
pub mod find;
pub mod quiz;
pub mod quizpart;
pub mod timing;
pub mod torrent_status;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

/// Pacing knobs every long-running loop takes from the CLI.
#[derive(Debug, Clone, Copy)]
pub struct LoopOptions {
    /// Seconds between job-selection cycles.
    pub interval: Duration,

    /// Sleep when a cycle found nothing to do.
    pub wait: Duration,

    /// How long a row stays banned after a temporary failure.
    pub ban_duration: Duration,

    /// Stagger before this loop's first cycle.
    pub startup_delay: Duration,
}

/// Temporary exclusion of row ids after transient failures. Entries expire
/// after `ban_duration`; expiry happens lazily on each query cycle.
#[derive(Debug)]
pub struct BanMap {
    banned_at: HashMap<i32, Instant>,
    ban_duration: Duration,
}

impl BanMap {
    #[must_use]
    pub fn new(ban_duration: Duration) -> Self {
        Self {
            banned_at: HashMap::new(),
            ban_duration,
        }
    }

    pub fn ban(&mut self, id: i32) {
        self.banned_at.insert(id, Instant::now());
    }

    pub fn expire(&mut self) {
        let cutoff = self.ban_duration;
        self.banned_at.retain(|_, at| at.elapsed() < cutoff);
    }

    #[must_use]
    pub fn is_banned(&self, id: i32) -> bool {
        self.banned_at
            .get(&id)
            .is_some_and(|at| at.elapsed() < self.ban_duration)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.banned_at.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.banned_at.is_empty()
    }
}

/// Store paths relative to the working directory when the file lives under
/// it; keeps database rows portable across hosts sharing the tree layout.
#[must_use]
pub fn try_make_relative(path: &Path) -> PathBuf {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(&cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
}
