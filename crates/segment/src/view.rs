use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::{DiskMetrics, LogSegmentName, SegmentError};

/// Chunk size used when streaming a byte range into a writer.
pub const TRANSFER_CHUNK_BYTES: usize = 64 * 1024;

/// Positional read access to the file behind a segment.
///
/// Implementations must be usable from several readers at once; no method
/// moves a shared cursor.
pub trait SegmentFile: Send + Sync {
    /// Reads into `buf` starting at `position` until `buf` is full or the end
    /// of the file is reached. Returns the number of bytes read, which is
    /// short only at end of file.
    fn read_at(&self, buf: &mut [u8], position: u64) -> io::Result<usize>;

    /// Copies up to `count` bytes starting at `position` into `sink`,
    /// returning the number of bytes copied. Stops early at end of file.
    fn transfer_to(&self, position: u64, count: u64, sink: &mut dyn Write) -> io::Result<u64> {
        let mut buf = vec![0u8; (count as usize).min(TRANSFER_CHUNK_BYTES)];
        let mut copied = 0u64;
        while copied < count {
            let want = ((count - copied) as usize).min(buf.len());
            let n = self.read_at(&mut buf[..want], position + copied)?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n])?;
            copied += n as u64;
            if n < want {
                break;
            }
        }
        Ok(copied)
    }
}

impl SegmentFile for File {
    fn read_at(&self, buf: &mut [u8], position: u64) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match pread(self, &mut buf[filled..], position + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], position: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, position)
}

#[cfg(windows)]
fn pread(file: &File, buf: &mut [u8], position: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, position)
}

/// A lease on a segment's file, handed out by [`LogSegment::view`].
///
/// Every view must be given back through [`LogSegment::close_view`] exactly
/// once.
#[derive(Clone)]
pub struct SegmentView {
    pub path: PathBuf,
    pub file: Arc<dyn SegmentFile>,
}

impl std::fmt::Debug for SegmentView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentView").field("path", &self.path).finish()
    }
}

/// One named, bounded region of the log.
pub trait LogSegment: Send + Sync {
    fn name(&self) -> &LogSegmentName;

    /// Number of bytes currently readable in this segment.
    fn end_offset(&self) -> u64;

    /// Acquires a view of the segment file.
    fn view(&self) -> Result<SegmentView, SegmentError>;

    /// Releases one view previously returned by [`view`](LogSegment::view).
    fn close_view(&self);
}

/// The log as seen by readers.
pub trait Log: Send + Sync {
    /// Looks up a segment by name.
    fn segment(&self, name: &LogSegmentName) -> Option<Arc<dyn LogSegment>>;

    /// The lowest-ordered segment, used to resolve legacy offsets.
    fn first_segment(&self) -> Option<Arc<dyn LogSegment>>;

    /// Sink for disk read timings, if the log records them.
    fn disk_metrics(&self) -> Option<Arc<dyn DiskMetrics>> {
        None
    }
}
