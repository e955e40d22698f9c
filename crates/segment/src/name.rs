use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::Read;
use std::str::FromStr;

use crate::SegmentError;

/// Upper bound on an encoded name. Prevents huge allocations on corrupt input.
const MAX_NAME_BYTES: usize = 256;

/// Name of one log segment.
///
/// Segments are ordered by `position` (their place in the log) and then by
/// `generation` (bumped when a segment is rewritten in place). The derived
/// `Ord` relies on that field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogSegmentName {
    position: u64,
    generation: u64,
}

impl LogSegmentName {
    /// Builds a name from its place in the log and its rewrite generation.
    pub fn new(position: u64, generation: u64) -> Self {
        Self {
            position,
            generation,
        }
    }

    /// The very first segment of a fresh log.
    pub fn first() -> Self {
        Self::new(0, 0)
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// How many times the segment at this position has been rewritten.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Name of the segment that follows this one when the log rolls over.
    #[must_use]
    pub fn next_position(&self) -> Self {
        Self::new(self.position + 1, 0)
    }

    /// Serializes as `[len: u32 BE][utf8 name]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let text = self.to_string();
        let mut buf = Vec::with_capacity(4 + text.len());
        // Writes into a Vec cannot fail.
        let _ = buf.write_u32::<BigEndian>(text.len() as u32);
        buf.extend_from_slice(text.as_bytes());
        buf
    }

    /// Reads a name written by [`to_bytes`](LogSegmentName::to_bytes).
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, SegmentError> {
        let len = reader.read_u32::<BigEndian>()? as usize;
        if len > MAX_NAME_BYTES {
            return Err(SegmentError::InvalidName(format!("<{} bytes>", len)));
        }
        let mut raw = vec![0u8; len];
        reader.read_exact(&mut raw)?;
        let text = String::from_utf8(raw)
            .map_err(|e| SegmentError::InvalidName(String::from_utf8_lossy(e.as_bytes()).into()))?;
        text.parse()
    }
}

impl fmt::Display for LogSegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.position, self.generation)
    }
}

impl FromStr for LogSegmentName {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pos, gen) = s
            .split_once('_')
            .ok_or_else(|| SegmentError::InvalidName(s.to_string()))?;
        let position = pos
            .parse::<u64>()
            .map_err(|_| SegmentError::InvalidName(s.to_string()))?;
        let generation = gen
            .parse::<u64>()
            .map_err(|_| SegmentError::InvalidName(s.to_string()))?;
        Ok(Self::new(position, generation))
    }
}
