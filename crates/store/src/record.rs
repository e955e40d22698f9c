//! On-disk layout of one stored blob.
//!
//! ```text
//! ┌──────────────┬──────────────┬─────┬──────────┬────────────────┬───────────┬──────────┐
//! │ magic: u32   │ key_len: u16 │ key │ size:u64 │ expires_ms:i64 │ crc32:u32 │ blob ... │
//! │ "BLB1"       │              │     │          │                │           │          │
//! └──────────────┴──────────────┴─────┴──────────┴────────────────┴───────────┴──────────┘
//! ```
//!
//! All integers are big-endian. The index points at the first blob byte, so a
//! read descriptor covers exactly the payload.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use message::{BlobId, BlobIdFactory, KeyError, StoreKey, StoreKeyFactory};
use std::io::{self, Cursor};

/// `"BLB1"` in ASCII.
pub const RECORD_MAGIC: u32 = 0x424C_4231;

/// Decoded record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub key: String,
    pub size: u64,
    pub expiration_ms: i64,
    pub crc: u32,
    /// Bytes from the start of the record to the first blob byte.
    pub header_len: u64,
}

/// Outcome of decoding the record at the start of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Decoded {
    /// A complete record, blob included.
    Record(RecordHeader),
    /// The buffer ends inside the record.
    Truncated,
    /// The bytes are not a record.
    Corrupt(String),
}

/// Encodes a record. Returns the bytes and the header length.
pub(crate) fn encode(key: &BlobId, data: &[u8], expiration_ms: i64) -> io::Result<(Vec<u8>, u64)> {
    let key_bytes = key.to_bytes();
    let mut buf = Vec::with_capacity(4 + key_bytes.len() + 20 + data.len());
    buf.write_u32::<BigEndian>(RECORD_MAGIC)?;
    buf.extend_from_slice(&key_bytes);
    buf.write_u64::<BigEndian>(data.len() as u64)?;
    buf.write_i64::<BigEndian>(expiration_ms)?;
    buf.write_u32::<BigEndian>(crc32fast::hash(data))?;
    let header_len = buf.len() as u64;
    buf.extend_from_slice(data);
    Ok((buf, header_len))
}

/// Decodes the record starting at `buf[0]`.
pub(crate) fn decode(buf: &[u8]) -> Decoded {
    match parse(buf) {
        Ok(header) => Decoded::Record(header),
        Err(outcome) => outcome,
    }
}

fn parse(buf: &[u8]) -> Result<RecordHeader, Decoded> {
    let mut cur = Cursor::new(buf);
    let magic = cur.read_u32::<BigEndian>().map_err(classify)?;
    if magic != RECORD_MAGIC {
        return Err(Decoded::Corrupt(format!("bad record magic {:#010x}", magic)));
    }
    let key = BlobIdFactory.read_key(&mut cur).map_err(|e| match e {
        KeyError::Io(e) => classify(e),
        other => Decoded::Corrupt(other.to_string()),
    })?;
    let size = cur.read_u64::<BigEndian>().map_err(classify)?;
    let expiration_ms = cur.read_i64::<BigEndian>().map_err(classify)?;
    let crc = cur.read_u32::<BigEndian>().map_err(classify)?;

    let header_len = cur.position();
    if (buf.len() as u64 - header_len) < size {
        return Err(Decoded::Truncated);
    }
    Ok(RecordHeader {
        key: key.id(),
        size,
        expiration_ms,
        crc,
        header_len,
    })
}

fn classify(e: io::Error) -> Decoded {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Decoded::Truncated
    } else {
        Decoded::Corrupt(e.to_string())
    }
}
