// Operation metrics
//
// Lock-free counters for what the engine did during one process lifetime

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by the command facade
///
/// Uses atomic operations for thread-safe tracking without locks. Logged on
/// shutdown or on demand.
#[derive(Debug)]
pub struct Metrics {
    pub scans: AtomicUsize,

    /// Files whose content hash had to be recomputed
    pub files_hashed: AtomicUsize,

    /// Toggles that actually renamed a file
    pub toggles: AtomicUsize,

    pub snapshots_created: AtomicUsize,

    /// Snapshot requests that found nothing staged
    pub snapshots_skipped: AtomicUsize,

    pub rollbacks: AtomicUsize,

    /// `git` invocations that exited non-zero or could not start
    pub git_failures: AtomicUsize,

    /// Total scan time in milliseconds
    pub total_scan_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans: AtomicUsize::new(0),
            files_hashed: AtomicUsize::new(0),
            toggles: AtomicUsize::new(0),
            snapshots_created: AtomicUsize::new(0),
            snapshots_skipped: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            git_failures: AtomicUsize::new(0),
            total_scan_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed scan and how many files it hashed
    pub fn record_scan(&self, duration: Duration, hashed: usize) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.files_hashed.fetch_add(hashed, Ordering::Relaxed);
        self.total_scan_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_toggle(&self) {
        self.toggles.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a snapshot request; `created` is false when there was nothing to commit
    pub fn record_snapshot(&self, created: bool) {
        if created {
            self.snapshots_created.fetch_add(1, Ordering::Relaxed);
        } else {
            self.snapshots_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_git_failure(&self) {
        self.git_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average scan time in milliseconds
    pub fn avg_scan_time_ms(&self) -> f64 {
        let total = self.total_scan_time_ms.load(Ordering::Relaxed);
        let count = self.scans.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Operation Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Scans: {} (avg {:.2}ms), files hashed: {}",
            self.scans.load(Ordering::Relaxed),
            self.avg_scan_time_ms(),
            self.files_hashed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Toggles: {}, snapshots: {} created / {} skipped, rollbacks: {}",
            self.toggles.load(Ordering::Relaxed),
            self.snapshots_created.load(Ordering::Relaxed),
            self.snapshots_skipped.load(Ordering::Relaxed),
            self.rollbacks.load(Ordering::Relaxed)
        );
        tracing::info!("Git failures: {}", self.git_failures.load(Ordering::Relaxed));
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
