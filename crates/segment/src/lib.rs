//! # Segment - append-only segmented log
//!
//! The storage the blob read path reads from. A log is an ordered set of
//! **segments**, each backed by one file that only ever grows. A position in
//! the log is an [`Offset`]: the segment name plus a byte offset inside that
//! segment.
//!
//! The read path talks to the log only through the [`Log`] and
//! [`LogSegment`] traits so that tests can swap in doubles. [`FileLog`] is the
//! file-backed implementation.
//!
//! ## Segment files
//!
//! ```text
//! <data_dir>/0_0_log
//! <data_dir>/1_0_log
//! <data_dir>/2_0_log   <- active, receives appends
//! ```
//!
//! ## Offset encoding
//!
//! ```text
//! v1: [version=1: u16 BE][name_len: u32 BE][name utf8][offset: u64 BE]
//! v0: [version=0: u16 BE][offset: u64 BE]              (name = first segment)
//! ```
//!
//! All integers are big-endian.

mod file_log;
mod metrics;
mod name;
mod offset;
mod view;

pub use file_log::{FileLog, FileSegment, SEGMENT_FILE_SUFFIX};
pub use metrics::{DiskMetrics, DiskReadSnapshot, DiskReadStats};
pub use name::LogSegmentName;
pub use offset::{Offset, OFFSET_VERSION_0, OFFSET_VERSION_1};
pub use view::{Log, LogSegment, SegmentFile, SegmentView, TRANSFER_CHUNK_BYTES};

use std::io;
use thiserror::Error;

/// Errors that can occur while addressing or reading the log.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An encoded offset carried a version this build does not understand.
    #[error("unknown offset version {0}")]
    UnknownVersion(u16),

    /// A segment name did not have the `<position>_<generation>` form.
    #[error("invalid segment name {0:?}")]
    InvalidName(String),

    /// No segment with this name exists in the log.
    #[error("segment {0} not found")]
    UnknownSegment(LogSegmentName),

    /// The log has no segments at all.
    #[error("log has no segments")]
    EmptyLog,
}
