use anyhow::{Context, Result};
use message::BlobId;
use segment::Offset;
use tracing::trace;

use crate::record;
use crate::{BlobStore, IndexEntry};

impl BlobStore {
    /// Stores `data` under `key` and returns the offset of its first byte.
    ///
    /// `expiration_ms` is an absolute time in milliseconds, or
    /// [`message::INFINITE_TIME`]. Replaces any earlier blob with the same key.
    ///
    /// # Arguments
    ///
    /// * `key` - non-empty blob id, at most `u16::MAX` bytes.
    /// * `data` - blob bytes, stored after the record header.
    /// * `expiration_ms` - absolute expiration time.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the append fails. The index
    /// is left untouched in both cases.
    pub fn put(&mut self, key: &str, data: &[u8], expiration_ms: i64) -> Result<Offset> {
        let id = BlobId::new(key).with_context(|| format!("invalid key {:?}", key))?;
        let (bytes, header_len) = record::encode(&id, data, expiration_ms)?;

        let record_start = self.log.append(&bytes).context("failed to append record")?;
        let offset = Offset::new(*record_start.name(), record_start.offset() + header_len);

        self.index.insert(
            key.to_string(),
            IndexEntry {
                offset,
                size: data.len() as u64,
                expiration_ms,
                crc: crc32fast::hash(data),
            },
        );
        trace!(key, %offset, size = data.len(), "put blob");
        Ok(offset)
    }
}
