//! Binary layout of a persisted [`BlobReadOptions`](crate::BlobReadOptions).
//!
//! ## v1 (written)
//!
//! ```text
//! [version=1: u16][Offset::to_bytes()][size: u64][expires_at_ms: i64][key bytes]
//! ```
//!
//! ## v0 (read only)
//!
//! ```text
//! [version=0: u16][offset: u64][size: u64][expires_at_ms: i64][key bytes]
//! ```
//!
//! The decoder reads the version tag first and dispatches. Neither version
//! stores account id, container id or checksum.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use message::{MessageInfo, StoreKeyFactory};
use segment::{Log, Offset, SegmentError};
use std::io::Read;

use crate::ReadError;

/// Legacy version: offset is a bare `u64` in the log's first segment.
pub const VERSION_0: u16 = 0;
/// Current version: offset carries its segment name.
pub const VERSION_1: u16 = 1;

const VERSION_LENGTH: usize = 2;
const SIZE_LENGTH: usize = 8;
const EXPIRES_AT_MS_LENGTH: usize = 8;

/// Encodes `offset` and the persisted part of `info` in the current version.
pub(crate) fn write_v1(offset: &Offset, info: &MessageInfo) -> Vec<u8> {
    let offset_bytes = offset.to_bytes();
    let key = info.store_key();
    let mut buf = Vec::with_capacity(
        VERSION_LENGTH + offset_bytes.len() + SIZE_LENGTH + EXPIRES_AT_MS_LENGTH + key.size_in_bytes(),
    );
    // Writes into a Vec cannot fail.
    let _ = buf.write_u16::<BigEndian>(VERSION_1);
    buf.extend_from_slice(&offset_bytes);
    let _ = buf.write_u64::<BigEndian>(info.size());
    let _ = buf.write_i64::<BigEndian>(info.expiration_time_ms());
    buf.extend_from_slice(&key.to_bytes());
    buf
}

/// Decodes the offset and message metadata of one persisted descriptor.
///
/// The returned [`MessageInfo`] has unknown account and container ids, an
/// infinite operation time, life version 0 and no checksum.
pub(crate) fn read_versioned<R: Read + ?Sized>(
    reader: &mut R,
    factory: &dyn StoreKeyFactory,
    log: &dyn Log,
) -> Result<(Offset, MessageInfo), ReadError> {
    let version = reader.read_u16::<BigEndian>()?;
    let offset = match version {
        VERSION_0 => read_v0_offset(reader, log)?,
        VERSION_1 => Offset::read_from(reader, log)?,
        other => return Err(ReadError::UnknownVersion(other)),
    };
    let size = reader.read_u64::<BigEndian>()?;
    let expires_at_ms = reader.read_i64::<BigEndian>()?;
    let key = factory.read_key(&mut ReaderRef(reader))?;
    Ok((offset, MessageInfo::new(key, size, expires_at_ms)))
}

/// v0 stored only the byte offset; the segment is implicitly the first one.
fn read_v0_offset<R: Read + ?Sized>(reader: &mut R, log: &dyn Log) -> Result<Offset, ReadError> {
    let byte_offset = reader.read_u64::<BigEndian>()?;
    let first = log.first_segment().ok_or(SegmentError::EmptyLog)?;
    Ok(Offset::new(*first.name(), byte_offset))
}

/// Lets a possibly unsized reader be passed on as `&mut dyn Read`.
struct ReaderRef<'a, R: ?Sized>(&'a mut R);

impl<R: Read + ?Sized> Read for ReaderRef<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}
