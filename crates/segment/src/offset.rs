use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::Read;

use crate::{Log, LogSegmentName, SegmentError};

/// Legacy encoding: no segment name, only the byte offset.
pub const OFFSET_VERSION_0: u16 = 0;
/// Current encoding: segment name followed by the byte offset.
pub const OFFSET_VERSION_1: u16 = 1;

/// A position in the log: a segment plus a byte offset inside it.
///
/// Ordered by segment first, then by byte offset, which is the physical
/// order of the data in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Offset {
    name: LogSegmentName,
    offset: u64,
}

impl Offset {
    pub fn new(name: LogSegmentName, offset: u64) -> Self {
        Self { name, offset }
    }

    /// Segment the offset points into.
    pub fn name(&self) -> &LogSegmentName {
        &self.name
    }

    /// Byte position inside the segment.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Serializes using the current format version.
    ///
    /// Layout: `[version=1: u16][name_len: u32][name][offset: u64]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let name = self.name.to_bytes();
        let mut buf = Vec::with_capacity(2 + name.len() + 8);
        // Writes into a Vec cannot fail.
        let _ = buf.write_u16::<BigEndian>(OFFSET_VERSION_1);
        buf.extend_from_slice(&name);
        let _ = buf.write_u64::<BigEndian>(self.offset);
        buf
    }

    /// Reads an offset, dispatching on the leading version tag.
    ///
    /// Version 0 carries no segment name; it is resolved to the first segment
    /// of `log`, failing with [`SegmentError::EmptyLog`] if there is none.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R, log: &dyn Log) -> Result<Self, SegmentError> {
        let version = reader.read_u16::<BigEndian>()?;
        match version {
            OFFSET_VERSION_0 => {
                let offset = reader.read_u64::<BigEndian>()?;
                let first = log.first_segment().ok_or(SegmentError::EmptyLog)?;
                Ok(Self::new(*first.name(), offset))
            }
            OFFSET_VERSION_1 => {
                let name = LogSegmentName::read_from(reader)?;
                let offset = reader.read_u64::<BigEndian>()?;
                Ok(Self::new(name, offset))
            }
            other => Err(SegmentError::UnknownVersion(other)),
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.name, self.offset)
    }
}
