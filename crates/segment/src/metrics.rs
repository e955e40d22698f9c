use std::sync::atomic::{AtomicU64, Ordering};

/// Receives disk read timings.
pub trait DiskMetrics: Send + Sync {
    /// Records how long a read took, normalized to milliseconds per MiB.
    fn record_read_time_per_mb(&self, ms_per_mb: u64);
}

/// Lock-free accumulator for read timings.
#[derive(Debug, Default)]
pub struct DiskReadStats {
    count: AtomicU64,
    total_ms_per_mb: AtomicU64,
    max_ms_per_mb: AtomicU64,
    last_ms_per_mb: AtomicU64,
}

/// Point-in-time copy of [`DiskReadStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskReadSnapshot {
    pub count: u64,
    pub total_ms_per_mb: u64,
    pub max_ms_per_mb: u64,
    pub last_ms_per_mb: u64,
}

impl DiskReadSnapshot {
    /// Mean of all recorded samples, `0` if none were recorded.
    #[must_use]
    pub fn mean_ms_per_mb(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_ms_per_mb / self.count
        }
    }
}

impl DiskReadStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DiskReadSnapshot {
        DiskReadSnapshot {
            count: self.count.load(Ordering::Relaxed),
            total_ms_per_mb: self.total_ms_per_mb.load(Ordering::Relaxed),
            max_ms_per_mb: self.max_ms_per_mb.load(Ordering::Relaxed),
            last_ms_per_mb: self.last_ms_per_mb.load(Ordering::Relaxed),
        }
    }
}

impl DiskMetrics for DiskReadStats {
    fn record_read_time_per_mb(&self, ms_per_mb: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms_per_mb.fetch_add(ms_per_mb, Ordering::Relaxed);
        self.max_ms_per_mb.fetch_max(ms_per_mb, Ordering::Relaxed);
        self.last_ms_per_mb.store(ms_per_mb, Ordering::Relaxed);
    }
}
