use bytes::Bytes;
use message::{MessageInfo, StoreKeyFactory};
use segment::{DiskMetrics, Log, LogSegment, LogSegmentName, Offset, SegmentError, SegmentFile, SegmentView};
use std::cmp::Ordering;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;
use std::time::Instant;
use tracing::{trace, warn};

use crate::format;
use crate::ReadError;

/// Bytes loaded by [`BlobReadOptions::prefetch`].
struct Prefetched {
    data: Bytes,
    /// Position of `data[0]` relative to the start of the blob.
    relative_offset: u64,
}

/// One blob to read: where it lives and what it is.
///
/// Construction checks that the blob lies inside its segment and then holds
/// a view of the segment file until [`close`](BlobReadOptions::close) (or
/// drop). The view is released exactly once no matter how many times, or
/// from how many threads, `close` is called.
///
/// # States
///
/// ```text
/// open ──prefetch──> open + prefetched
///   │                       │
///   └───────close───────────┴──> closed (terminal)
/// ```
///
/// Prefetching a closed descriptor fails with [`ReadError::Closed`].
pub struct BlobReadOptions {
    segment: Arc<dyn LogSegment>,
    view: SegmentView,
    offset: Offset,
    info: MessageInfo,
    open: AtomicBool,
    disk_metrics: Option<Arc<dyn DiskMetrics>>,
    prefetched: Option<Prefetched>,
}

impl std::fmt::Debug for BlobReadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobReadOptions")
            .field("offset", &self.offset)
            .field("size", &self.info.size())
            .field("key", &self.info.store_key().id())
            .field("path", &self.view.path)
            .field("open", &self.is_open())
            .field(
                "prefetched",
                &self
                    .prefetched
                    .as_ref()
                    .map(|p| (p.relative_offset, p.data.len())),
            )
            .finish()
    }
}

impl BlobReadOptions {
    /// Binds `offset` and `info` to a view of the segment they live in.
    ///
    /// # Errors
    ///
    /// * [`SegmentError::UnknownSegment`] if the log has no such segment.
    /// * [`ReadError::InvalidRange`] if `offset + size` exceeds the
    ///   segment's end offset. No view is acquired in that case.
    /// * Whatever the segment reports while handing out the view.
    pub fn new(log: &dyn Log, offset: Offset, info: MessageInfo) -> Result<Self, ReadError> {
        let segment = log
            .segment(offset.name())
            .ok_or(SegmentError::UnknownSegment(*offset.name()))?;

        let end_offset = segment.end_offset();
        let fits = offset
            .offset()
            .checked_add(info.size())
            .is_some_and(|end| end <= end_offset);
        if !fits {
            return Err(ReadError::InvalidRange {
                offset,
                size: info.size(),
                end_offset,
            });
        }

        let view = segment.view()?;
        trace!(%offset, size = info.size(), key = %info.store_key().id(), "blob read options");

        Ok(Self {
            segment,
            view,
            offset,
            info,
            open: AtomicBool::new(true),
            disk_metrics: log.disk_metrics(),
            prefetched: None,
        })
    }

    /// Decodes a descriptor written by [`to_bytes`](BlobReadOptions::to_bytes)
    /// (or by the legacy v0 writer) and binds it to `log`.
    ///
    /// Account id, container id and checksum are not persisted; the decoded
    /// [`MessageInfo`] carries the "unknown" defaults.
    ///
    /// # Errors
    ///
    /// [`ReadError::UnknownVersion`] for an unrecognised version tag, any
    /// decoding error, or any error from [`new`](BlobReadOptions::new).
    pub fn from_reader<R: Read + ?Sized>(
        reader: &mut R,
        factory: &dyn StoreKeyFactory,
        log: &dyn Log,
    ) -> Result<Self, ReadError> {
        let (offset, info) = format::read_versioned(reader, factory, log)?;
        Self::new(log, offset, info)
    }

    /// Serializes in the current (v1) format.
    pub fn to_bytes(&self) -> Vec<u8> {
        format::write_v1(&self.offset, &self.info)
    }

    /// Name of the segment holding the blob.
    pub fn segment_name(&self) -> &LogSegmentName {
        self.offset.name()
    }

    /// Byte offset of the blob inside its segment.
    pub fn offset(&self) -> u64 {
        self.offset.offset()
    }

    /// Full log position of the blob.
    pub fn position(&self) -> &Offset {
        &self.offset
    }

    /// Metadata of the blob: key, size, expiration and, when known, account,
    /// container and CRC.
    ///
    /// For a descriptor decoded from bytes only key, size and expiration are
    /// real; the rest hold their "unknown" defaults.
    pub fn message_info(&self) -> &MessageInfo {
        &self.info
    }

    /// Path of the segment file, as reported by the view.
    pub fn file_path(&self) -> &Path {
        &self.view.path
    }

    /// Shared read handle of the segment file.
    ///
    /// Stays usable after [`close`](BlobReadOptions::close); closing only
    /// releases the view count held on the segment.
    pub fn file(&self) -> &Arc<dyn SegmentFile> {
        &self.view.file
    }

    /// Prefetched bytes, if [`prefetch`](BlobReadOptions::prefetch) succeeded.
    pub fn prefetched_data(&self) -> Option<&Bytes> {
        self.prefetched.as_ref().map(|p| &p.data)
    }

    /// Blob-relative offset of the first prefetched byte.
    pub fn prefetched_relative_offset(&self) -> Option<u64> {
        self.prefetched.as_ref().map(|p| p.relative_offset)
    }

    /// `false` once [`close`](BlobReadOptions::close) has run.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(atomic::Ordering::Acquire)
    }

    /// Loads `min(size, blob_size - relative_offset)` bytes, starting
    /// `relative_offset` bytes into the blob, into a new buffer.
    ///
    /// Replaces any previously prefetched buffer. On success the read time per
    /// MiB is recorded if the log provides disk metrics.
    ///
    /// # Errors
    ///
    /// * [`ReadError::Closed`] after [`close`](BlobReadOptions::close).
    /// * [`ReadError::RangeOutsideBlob`] if `relative_offset` is past the blob.
    /// * [`ReadError::IoFailure`] if the file returned fewer bytes than expected.
    /// * [`ReadError::Io`] if the read itself failed.
    pub fn prefetch(&mut self, relative_offset: u64, size: u64) -> Result<(), ReadError> {
        if !self.is_open() {
            return Err(ReadError::Closed(self.offset));
        }
        let blob_size = self.info.size();
        let remaining = blob_size
            .checked_sub(relative_offset)
            .ok_or(ReadError::RangeOutsideBlob {
                relative_offset,
                size: blob_size,
            })?;
        let size_to_read = size.min(remaining);
        let position = self.offset.offset() + relative_offset;

        let mut buf = vec![0u8; size_to_read as usize];
        let started = Instant::now();
        let read = self.view.file.read_at(&mut buf, position)? as u64;
        if read != size_to_read {
            let err = ReadError::IoFailure {
                path: self.view.path.clone(),
                offset: position,
                expected: size_to_read,
                actual: read,
            };
            warn!(segment = %self.offset.name(), "{}", err);
            return Err(err);
        }

        if let Some(metrics) = &self.disk_metrics {
            if size_to_read > 0 {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                metrics.record_read_time_per_mb(elapsed_ms.saturating_mul(1 << 20) / size_to_read);
            }
        }

        self.prefetched = Some(Prefetched {
            data: Bytes::from(buf),
            relative_offset,
        });
        Ok(())
    }

    /// Releases the segment view. Only the first call has any effect.
    ///
    /// Safe to call from several threads; exactly one of them releases the
    /// view. Prefetched data stays readable afterwards.
    pub fn close(&self) {
        if self
            .open
            .compare_exchange(true, false, atomic::Ordering::AcqRel, atomic::Ordering::Acquire)
            .is_ok()
        {
            self.segment.close_view();
            trace!(offset = %self.offset, "closed blob read options");
        }
    }
}

impl Drop for BlobReadOptions {
    fn drop(&mut self) {
        self.close();
    }
}

impl PartialEq for BlobReadOptions {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}

impl Eq for BlobReadOptions {}

impl PartialOrd for BlobReadOptions {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlobReadOptions {
    fn cmp(&self, other: &Self) -> Ordering {
        self.offset.cmp(&other.offset)
    }
}
