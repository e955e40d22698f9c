//! # Message - store keys and per-message metadata
//!
//! The read path only needs three things from a message: its key, its size
//! and its expiration time. Everything else in [`MessageInfo`] is carried
//! along for callers and is not persisted by read checkpoints.
//!
//! ## Key encoding ([`BlobId`])
//!
//! ```text
//! [id_len: u16 BE][id bytes]
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use thiserror::Error;

/// Expiration / operation time meaning "never".
pub const INFINITE_TIME: i64 = -1;
/// Account id used when the real one is not known.
pub const UNKNOWN_ACCOUNT_ID: i16 = -1;
/// Container id used when the real one is not known.
pub const UNKNOWN_CONTAINER_ID: i16 = -1;
/// Life version assigned to freshly written or decoded messages.
pub const DEFAULT_LIFE_VERSION: i16 = 0;

/// Errors produced while decoding keys.
#[derive(Debug, Error)]
pub enum KeyError {
    /// An underlying I/O error (including a truncated key).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The key id is empty or longer than a `u16` length prefix allows.
    #[error("invalid key length {0}")]
    InvalidLength(usize),

    /// The key bytes are not valid UTF-8.
    #[error("key is not valid utf-8")]
    InvalidUtf8,
}

/// A key identifying one stored message.
pub trait StoreKey: fmt::Debug + Send + Sync {
    /// Serialized form, readable back through the matching [`StoreKeyFactory`].
    fn to_bytes(&self) -> Vec<u8>;

    /// Length of [`to_bytes`](StoreKey::to_bytes) in bytes.
    fn size_in_bytes(&self) -> usize;

    /// Human readable id, used in logs and the CLI.
    fn id(&self) -> String;
}

impl PartialEq for dyn StoreKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for dyn StoreKey {}

/// Shared handle to a key.
pub type SharedKey = Arc<dyn StoreKey>;

/// Decodes keys from a byte stream.
pub trait StoreKeyFactory: Send + Sync {
    /// Reads exactly one key from `reader`.
    fn read_key(&self, reader: &mut dyn Read) -> Result<SharedKey, KeyError>;
}

/// The concrete key used by the blob store: a UTF-8 id with a u16 length prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId {
    id: String,
}

impl BlobId {
    /// Creates a blob id, rejecting empty ids and ids longer than `u16::MAX` bytes.
    pub fn new<S: Into<String>>(id: S) -> Result<Self, KeyError> {
        let id = id.into();
        if id.is_empty() || id.len() > u16::MAX as usize {
            return Err(KeyError::InvalidLength(id.len()));
        }
        Ok(Self { id })
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Convenience for building a [`SharedKey`].
    pub fn shared<S: Into<String>>(id: S) -> Result<SharedKey, KeyError> {
        Ok(Arc::new(Self::new(id)?))
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl StoreKey for BlobId {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size_in_bytes());
        // Length was validated in `new`, writes into a Vec cannot fail.
        let _ = buf.write_u16::<BigEndian>(self.id.len() as u16);
        buf.extend_from_slice(self.id.as_bytes());
        buf
    }

    fn size_in_bytes(&self) -> usize {
        2 + self.id.len()
    }

    fn id(&self) -> String {
        self.id.clone()
    }
}

/// Factory for [`BlobId`] keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlobIdFactory;

impl StoreKeyFactory for BlobIdFactory {
    fn read_key(&self, reader: &mut dyn Read) -> Result<SharedKey, KeyError> {
        let len = reader.read_u16::<BigEndian>()? as usize;
        if len == 0 {
            return Err(KeyError::InvalidLength(0));
        }
        let mut raw = vec![0u8; len];
        reader.read_exact(&mut raw)?;
        let id = String::from_utf8(raw).map_err(|_| KeyError::InvalidUtf8)?;
        Ok(Arc::new(BlobId { id }))
    }
}

/// Metadata describing one message in the log.
#[derive(Debug, Clone)]
pub struct MessageInfo {
    key: SharedKey,
    size: u64,
    expiration_time_ms: i64,
    account_id: i16,
    container_id: i16,
    operation_time_ms: i64,
    life_version: i16,
    crc: Option<u64>,
}

impl MessageInfo {
    /// A message with unknown account/container and no checksum.
    pub fn new(key: SharedKey, size: u64, expiration_time_ms: i64) -> Self {
        Self {
            key,
            size,
            expiration_time_ms,
            account_id: UNKNOWN_ACCOUNT_ID,
            container_id: UNKNOWN_CONTAINER_ID,
            operation_time_ms: INFINITE_TIME,
            life_version: DEFAULT_LIFE_VERSION,
            crc: None,
        }
    }

    /// Sets the owning account and container.
    ///
    /// # Arguments
    ///
    /// * `account_id` - account id, or [`UNKNOWN_ACCOUNT_ID`].
    /// * `container_id` - container id, or [`UNKNOWN_CONTAINER_ID`].
    pub fn with_account(mut self, account_id: i16, container_id: i16) -> Self {
        self.account_id = account_id;
        self.container_id = container_id;
        self
    }

    /// Sets the time the message was written, in epoch milliseconds.
    pub fn with_operation_time(mut self, operation_time_ms: i64) -> Self {
        self.operation_time_ms = operation_time_ms;
        self
    }

    /// Sets the life version, bumped each time the blob is undeleted.
    pub fn with_life_version(mut self, life_version: i16) -> Self {
        self.life_version = life_version;
        self
    }

    /// Attaches the checksum of the message bytes.
    pub fn with_crc(mut self, crc: u64) -> Self {
        self.crc = Some(crc);
        self
    }

    /// Key of the message.
    pub fn store_key(&self) -> &SharedKey {
        &self.key
    }

    /// Size of the blob in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Absolute expiration in epoch milliseconds, or [`INFINITE_TIME`].
    pub fn expiration_time_ms(&self) -> i64 {
        self.expiration_time_ms
    }

    pub fn account_id(&self) -> i16 {
        self.account_id
    }

    pub fn container_id(&self) -> i16 {
        self.container_id
    }

    pub fn operation_time_ms(&self) -> i64 {
        self.operation_time_ms
    }

    pub fn life_version(&self) -> i16 {
        self.life_version
    }

    /// Checksum of the blob, if one was recorded.
    pub fn crc(&self) -> Option<u64> {
        self.crc
    }

    /// Returns `true` if the message has a finite expiration time at or
    /// before `now_ms`.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiration_time_ms != INFINITE_TIME && self.expiration_time_ms <= now_ms
    }
}

#[cfg(test)]
mod tests;
