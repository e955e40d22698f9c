//! # Config - blob store settings
//!
//! All settings are read from environment variables, each falling back to a
//! default when unset or unparseable:
//!
//! ```text
//! BLOBSTORE_DATA_DIR             segment directory            (default: "data/blobs")
//! BLOBSTORE_SEGMENT_CAPACITY_KB  segment capacity in KiB      (default: 4096)
//! BLOBSTORE_PREFETCH_KB          prefetch chunk in KiB        (default: 4096)
//! BLOBSTORE_FSYNC                fsync every append           (default: "true")
//! BLOBSTORE_DISK_METRICS         record disk read timings     (default: "true")
//! BLOBSTORE_HEALTH_ERRORS        consecutive I/O errors before
//!                                the disk is marked unhealthy (default: 3)
//! ```

use std::path::PathBuf;

pub const ENV_DATA_DIR: &str = "BLOBSTORE_DATA_DIR";
pub const ENV_SEGMENT_CAPACITY_KB: &str = "BLOBSTORE_SEGMENT_CAPACITY_KB";
pub const ENV_PREFETCH_KB: &str = "BLOBSTORE_PREFETCH_KB";
pub const ENV_FSYNC: &str = "BLOBSTORE_FSYNC";
pub const ENV_DISK_METRICS: &str = "BLOBSTORE_DISK_METRICS";
pub const ENV_HEALTH_ERRORS: &str = "BLOBSTORE_HEALTH_ERRORS";

/// Default segment capacity (4 MiB).
pub const DEFAULT_SEGMENT_CAPACITY: u64 = 4 * 1024 * 1024;
/// Default prefetch chunk (4 MiB).
pub const DEFAULT_PREFETCH_CHUNK: u64 = 4 * 1024 * 1024;
/// Default number of consecutive read errors that marks a disk unhealthy.
pub const DEFAULT_UNHEALTHY_AFTER_ERRORS: u32 = 3;

/// Settings shared by the store and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding the segment files.
    pub data_dir: PathBuf,
    /// Maximum size of a single segment file in bytes.
    pub segment_capacity: u64,
    /// Upper bound for a single prefetch call in bytes.
    pub prefetch_chunk: u64,
    /// If `true`, every append is followed by `fsync`.
    pub sync_writes: bool,
    /// If `true`, prefetch timings are recorded per MiB read.
    pub disk_metrics: bool,
    /// Consecutive media errors before the disk is reported unhealthy.
    pub unhealthy_after_errors: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/blobs"),
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            prefetch_chunk: DEFAULT_PREFETCH_CHUNK,
            sync_writes: true,
            disk_metrics: true,
            unhealthy_after_errors: DEFAULT_UNHEALTHY_AFTER_ERRORS,
        }
    }
}

impl StoreConfig {
    /// Builds a config from the `BLOBSTORE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Missing or unparseable
    /// values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let kib = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .and_then(|v| v.checked_mul(1024))
                .unwrap_or(default)
        };
        let flag = |key: &str, default: bool| {
            lookup(key)
                .and_then(|v| v.trim().parse::<bool>().ok())
                .unwrap_or(default)
        };

        Self {
            data_dir: lookup(ENV_DATA_DIR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            segment_capacity: kib(ENV_SEGMENT_CAPACITY_KB, defaults.segment_capacity),
            prefetch_chunk: kib(ENV_PREFETCH_KB, defaults.prefetch_chunk),
            sync_writes: flag(ENV_FSYNC, defaults.sync_writes),
            disk_metrics: flag(ENV_DISK_METRICS, defaults.disk_metrics),
            unhealthy_after_errors: lookup(ENV_HEALTH_ERRORS)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(defaults.unhealthy_after_errors),
        }
    }

    /// Returns a copy rooted at `dir`. Handy for tests.
    pub fn with_data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.data_dir = dir.into();
        self
    }
}
