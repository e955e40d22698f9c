/// Index rebuild on open.
///
/// Walks every segment from its first byte, decoding records back to back.
/// A truncated or unreadable record ends the scan of that segment; if it is
/// the active segment the tail is cut off so that new records follow the
/// last good one.
use anyhow::{Context, Result};
use segment::{FileLog, FileSegment, LogSegment, Offset};
use std::collections::HashMap;
use std::fs;
use tracing::{debug, warn};

use crate::record::{self, Decoded};
use crate::IndexEntry;

pub(crate) fn rebuild_index(log: &FileLog) -> Result<HashMap<String, IndexEntry>> {
    let mut index = HashMap::new();
    let active = log.active_segment_name();

    for segment in log.segments() {
        let good_end = scan_segment(&segment, &mut index)?;
        if good_end < segment.end_offset() && *segment.name() == active {
            log.truncate_active(good_end)
                .with_context(|| format!("failed to truncate segment {}", segment.name()))?;
        }
    }
    Ok(index)
}

/// Indexes every complete record in `segment` and returns the offset just
/// past the last one.
fn scan_segment(segment: &FileSegment, index: &mut HashMap<String, IndexEntry>) -> Result<u64> {
    let end = segment.end_offset() as usize;
    let buf = fs::read(segment.path())
        .with_context(|| format!("failed to read segment {}", segment.path().display()))?;
    let buf = &buf[..end.min(buf.len())];

    let mut pos = 0usize;
    let mut records = 0usize;
    while pos < buf.len() {
        match record::decode(&buf[pos..]) {
            Decoded::Record(header) => {
                let blob_start = pos as u64 + header.header_len;
                index.insert(
                    header.key,
                    IndexEntry {
                        offset: Offset::new(*segment.name(), blob_start),
                        size: header.size,
                        expiration_ms: header.expiration_ms,
                        crc: header.crc,
                    },
                );
                pos = (blob_start + header.size) as usize;
                records += 1;
            }
            Decoded::Truncated => {
                warn!(
                    segment = %segment.name(),
                    offset = pos,
                    dropped = buf.len() - pos,
                    "truncated record at segment tail"
                );
                break;
            }
            Decoded::Corrupt(reason) => {
                warn!(segment = %segment.name(), offset = pos, %reason, "unreadable record, skipping rest of segment");
                break;
            }
        }
    }

    debug!(segment = %segment.name(), records, "scanned segment");
    Ok(pos as u64)
}
