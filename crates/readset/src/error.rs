use message::KeyError;
use segment::{Offset, SegmentError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// `EIO` on every unix the store runs on.
#[cfg(unix)]
const EIO: i32 = 5;

/// Errors raised by read descriptors and read sets.
#[derive(Debug, Error)]
pub enum ReadError {
    /// `offset + size` runs past the end of the segment. Raised before any
    /// view is acquired.
    #[error("invalid offset {offset} and size {size}, segment end offset {end_offset}")]
    InvalidRange {
        offset: Offset,
        size: u64,
        end_offset: u64,
    },

    /// An encoded descriptor carried an unknown version tag.
    #[error("unknown version {0} encountered for BlobReadOptions")]
    UnknownVersion(u16),

    /// A physical read returned fewer bytes than the blob occupies.
    #[error(
        "Input/output error: reading from {} at offset {}, expected {} bytes, but got {}",
        .path.display(),
        .offset,
        .expected,
        .actual
    )]
    IoFailure {
        path: PathBuf,
        offset: u64,
        expected: u64,
        actual: u64,
    },

    /// Any other I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An index past the end of a read set.
    #[error("index {index} out of the read set of size {size}")]
    IndexOutOfBounds { index: usize, size: usize },

    /// The channel transfer found a blob that was never prefetched.
    #[error("data at index {index} should be prefetched")]
    NotPrefetched { index: usize },

    /// A relative offset past the end of the blob.
    #[error("relative offset {relative_offset} is outside blob of size {size}")]
    RangeOutsideBlob { relative_offset: u64, size: u64 },

    /// A buffered read that does not fall inside the prefetched bytes.
    #[error("range [{relative_offset}, +{len}) is not inside the prefetched range [{base}, +{prefetched})")]
    OutsidePrefetched {
        relative_offset: u64,
        len: u64,
        base: u64,
        prefetched: u64,
    },

    /// The descriptor already released its segment view.
    #[error("read options at {0} are closed")]
    Closed(Offset),

    /// Segment lookup or offset decoding failed.
    #[error(transparent)]
    Segment(#[from] SegmentError),

    /// Key decoding failed.
    #[error(transparent)]
    Key(#[from] KeyError),
}

impl ReadError {
    /// Returns `true` if the error points at the storage medium rather than
    /// at the caller: a short physical read or an OS-level I/O error.
    ///
    /// Only these are reported to [`IoOutcomeHandler::on_error`](crate::IoOutcomeHandler::on_error).
    #[must_use]
    pub fn is_media_failure(&self) -> bool {
        match self {
            ReadError::IoFailure { .. } => true,
            ReadError::Io(e) | ReadError::Segment(SegmentError::Io(e)) => is_eio(e),
            _ => false,
        }
    }

    /// Returns `true` if the same read may succeed against another replica.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_media_failure()
    }

    /// Returns `true` for malformed or unknown encodings.
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            ReadError::UnknownVersion(_)
                | ReadError::Segment(SegmentError::UnknownVersion(_))
                | ReadError::Segment(SegmentError::InvalidName(_))
                | ReadError::Key(KeyError::InvalidLength(_))
                | ReadError::Key(KeyError::InvalidUtf8)
        )
    }
}

#[cfg(unix)]
fn is_eio(e: &io::Error) -> bool {
    e.raw_os_error() == Some(EIO)
}

#[cfg(not(unix))]
fn is_eio(_e: &io::Error) -> bool {
    false
}
