//! # Store - blob store over the segmented log
//!
//! Ties [`segment::FileLog`] and the [`readset`] read path together into a
//! small blob store: blobs are appended as self-describing records, indexed
//! in memory by key, and read back through [`StoreMessageReadSet`]s.
//!
//! ## Architecture
//!
//! ```text
//! put() → record::encode → FileLog::append → index[key] = Offset of blob
//!
//! get() → index lookup → BlobReadOptions per key → StoreMessageReadSet
//!                                                       │
//!                       prefetch outcomes ──> DiskHealth ┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                             |
//! |----------------|-----------------------------------------------------|
//! | [`lib.rs`]     | `BlobStore` struct, constructor, accessors, `Debug` |
//! | [`recovery`]   | Segment scan that rebuilds the index on open        |
//! | [`write`]      | `put()`                                             |
//! | [`read`]       | `get()`, `read_blob()`, `verify()`                  |
//! | [`record`]     | On-disk record layout                               |
//! | [`checkpoint`] | Persisted read descriptors (atomic file ops)        |
//! | [`health`]     | `DiskHealth` prefetch observer                      |
//!
//! ## Recovery
//!
//! The index is not persisted. [`BlobStore::open`] scans every segment from
//! the start; a record cut short by a crash ends the scan of its segment and,
//! in the active segment, is truncated away before new appends land.
mod checkpoint;
mod health;
mod read;
mod record;
mod recovery;
mod write;

use anyhow::{Context, Result};
use config::StoreConfig;
use segment::{DiskMetrics, DiskReadSnapshot, DiskReadStats, FileLog, Offset};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

pub use checkpoint::{ReadCheckpoint, CHECKPOINT_MAGIC};
pub use health::{DiskHealth, HealthSnapshot};
pub use readset::StoreMessageReadSet;
pub use record::RECORD_MAGIC;

/// Where a blob lives and what the record header said about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Position of the first blob byte.
    pub offset: Offset,
    /// Blob length in bytes, excluding the record header.
    pub size: u64,
    /// Absolute expiration in epoch milliseconds, or
    /// [`message::INFINITE_TIME`].
    pub expiration_ms: i64,
    /// CRC32 of the blob bytes.
    pub crc: u32,
}

/// A blob store backed by one [`FileLog`].
///
/// # Write Path
///
/// 1. Encode the record (header + blob) and append it as one unit.
/// 2. Point the key's index entry at the blob bytes. Later puts win.
///
/// # Read Path
///
/// 1. Resolve every key; a missing or expired key fails the whole batch.
/// 2. Bind each `(Offset, MessageInfo)` to a descriptor.
/// 3. Hand back a [`StoreMessageReadSet`] that reports prefetch outcomes to
///    the store's [`DiskHealth`].
pub struct BlobStore {
    pub(crate) config: StoreConfig,
    pub(crate) log: FileLog,
    pub(crate) index: HashMap<String, IndexEntry>,
    pub(crate) health: Arc<DiskHealth>,
    pub(crate) stats: Option<Arc<DiskReadStats>>,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("data_dir", &self.config.data_dir)
            .field("blobs", &self.index.len())
            .field("segments", &self.log.segment_count())
            .field("healthy", &self.health.is_healthy())
            .finish()
    }
}

impl BlobStore {
    /// Opens the store in `config.data_dir`, rebuilding the index from the
    /// segment files.
    ///
    /// A torn record at the end of the newest segment is cut off so that new
    /// appends follow the last complete record. Corrupt tails of older
    /// segments are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or listed, or if
    /// a segment file cannot be read or truncated.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let stats = config.disk_metrics.then(|| Arc::new(DiskReadStats::new()));
        let metrics = stats.clone().map(|s| s as Arc<dyn DiskMetrics>);

        let log = FileLog::open(
            &config.data_dir,
            config.segment_capacity,
            config.sync_writes,
            metrics,
        )
        .with_context(|| format!("failed to open log in {}", config.data_dir.display()))?;

        let index = recovery::rebuild_index(&log)?;
        info!(
            dir = %config.data_dir.display(),
            blobs = index.len(),
            segments = log.segment_count(),
            "opened blob store"
        );

        Ok(Self {
            health: Arc::new(DiskHealth::new(config.unhealthy_after_errors)),
            config,
            log,
            index,
            stats,
        })
    }

    /// Settings the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The underlying segmented log.
    pub fn log(&self) -> &FileLog {
        &self.log
    }

    /// Disk health fed by every read set handed out by
    /// [`get`](BlobStore::get).
    pub fn health(&self) -> &Arc<DiskHealth> {
        &self.health
    }

    /// Disk read timings, if enabled in the config.
    pub fn disk_stats(&self) -> Option<DiskReadSnapshot> {
        self.stats.as_ref().map(|s| s.snapshot())
    }

    /// Index entry for `key`, expired or not.
    pub fn entry(&self, key: &str) -> Option<&IndexEntry> {
        self.index.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests;
