use readset::IoOutcomeHandler;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tracing::{info, warn};

/// Tracks the outcome of prefetches against one disk.
///
/// The disk turns unhealthy after `threshold` media errors in a row and
/// healthy again on the next successful read.
#[derive(Debug)]
pub struct DiskHealth {
    threshold: u32,
    successes: AtomicU64,
    errors: AtomicU64,
    consecutive_errors: AtomicU32,
    healthy: AtomicBool,
}

/// Point-in-time copy of a [`DiskHealth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub successes: u64,
    pub errors: u64,
    pub consecutive_errors: u32,
    pub healthy: bool,
}

impl DiskHealth {
    /// A healthy disk that flips after `threshold` consecutive errors
    /// (at least one).
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            successes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            consecutive_errors: AtomicU32::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            successes: self.successes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            consecutive_errors: self.consecutive_errors.load(Ordering::Relaxed),
            healthy: self.is_healthy(),
        }
    }
}

impl IoOutcomeHandler for DiskHealth {
    fn on_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_errors.store(0, Ordering::Relaxed);
        if !self.healthy.swap(true, Ordering::AcqRel) {
            info!("disk healthy again after successful read");
        }
    }

    fn on_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        let streak = self.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;
        if streak >= self.threshold && self.healthy.swap(false, Ordering::AcqRel) {
            warn!(consecutive_errors = streak, "disk marked unhealthy");
        }
    }
}
