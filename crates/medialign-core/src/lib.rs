pub mod apply;
pub mod cancel;
pub mod library;
pub mod matcher;
pub mod normalize;
pub mod planner;
pub mod probe;
pub mod score;
pub mod tag;
pub mod tools;
pub mod tracker;
pub mod vocab;

use std::time::Instant;

use serde::{Deserialize, Serialize};

pub use cancel::{CancellationToken, CancelledError};
pub use matcher::{Disposition, MatchResult};
pub use probe::AudioTrack;
pub use tag::{TagError, TagProgress, TagRequest, TagRun};
pub use tracker::ChangeTracker;
pub use vocab::Vocabulary;

/// How a reconciliation run treated the filesystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    /// Nothing was touched; counters describe what would happen.
    #[default]
    DryRun,
    /// Changes were written to disk.
    Applied,
    /// The run was aborted and every recorded change was reverted.
    RolledBack,
}

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Sidecars renamed (possibly after a move).
    pub changed: u64,
    /// Sidecars moved into their primary's directory.
    pub moved: u64,
    /// Sidecars left alone (already canonical, or no match).
    pub skipped: u64,
    pub mode: RunMode,
}

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter — emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: std::sync::Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self {
            inner,
            last_emit: std::sync::Mutex::new(Instant::now() - std::time::Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let mut last = self.last_emit.lock().unwrap();
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_throttled_progress_suppresses_rapid_updates() {
        static CALLS: AtomicU64 = AtomicU64::new(0);
        let cb: &ProgressCallback = &|_, _, _, _| {
            CALLS.fetch_add(1, Ordering::SeqCst);
        };
        let tp = ThrottledProgress::new(cb);
        for i in 0..100 {
            tp.report("scan", i, 1000, "");
        }
        // first report passes, the rest fall inside the 200ms window
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_throttled_progress_always_emits_completion() {
        static CALLS: AtomicU64 = AtomicU64::new(0);
        let cb: &ProgressCallback = &|_, _, _, _| {
            CALLS.fetch_add(1, Ordering::SeqCst);
        };
        let tp = ThrottledProgress::new(cb);
        tp.report("scan", 0, 10, "");
        tp.report("scan", 9, 10, "done");
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }
}
