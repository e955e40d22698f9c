use anyhow::{bail, Context, Result};
use message::{BlobId, MessageInfo};
use readset::{BlobReadOptions, StoreMessageReadSet};
use tracing::{debug, warn};

use crate::BlobStore;

impl BlobStore {
    /// Builds a read set over `keys`, sorted by log position.
    ///
    /// # Errors
    ///
    /// Fails if any key is unknown or expired at `now_ms`, or if a blob no
    /// longer fits its segment. Views acquired for earlier keys are released.
    pub fn get(&self, keys: &[&str], now_ms: i64) -> Result<StoreMessageReadSet> {
        let mut read_options = Vec::with_capacity(keys.len());
        for key in keys {
            let info = self.message_info(key)?;
            if info.is_expired(now_ms) {
                bail!("blob {:?} expired at {}", key, info.expiration_time_ms());
            }
            let entry = self.index[*key];
            let options = BlobReadOptions::new(&self.log, entry.offset, info)
                .with_context(|| format!("failed to open blob {:?}", key))?;
            read_options.push(options);
        }
        debug!(count = read_options.len(), "built read set");
        Ok(StoreMessageReadSet::with_handler(
            read_options,
            self.health.clone(),
        ))
    }

    /// Reads a whole blob, one prefetch chunk at a time.
    pub fn read_blob(&self, key: &str, now_ms: i64) -> Result<Vec<u8>> {
        let mut set = self.get(&[key], now_ms)?;
        let size = set.size_in_bytes(0)?;
        let chunk = self.config.prefetch_chunk.max(1);

        let mut out = Vec::with_capacity(size as usize);
        let mut relative = 0u64;
        while relative < size {
            set.prefetch(0, relative, chunk)?;
            relative += set.write_to(0, &mut out, relative, chunk)?;
        }
        Ok(out)
    }

    /// Re-reads the blob under `key` and checks it against the CRC32 stored
    /// in its record header. Returns `false` on a mismatch.
    pub fn verify(&self, key: &str) -> Result<bool> {
        let mut set = self.get(&[key], i64::MIN)?;
        let size = set.size_in_bytes(0)?;
        let chunk = self.config.prefetch_chunk.max(1);

        let mut hasher = crc32fast::Hasher::new();
        let mut relative = 0u64;
        while relative < size {
            set.prefetch(0, relative, chunk)?;
            let data = set
                .prefetched_data(0)?
                .context("prefetch returned no data")?;
            hasher.update(&data);
            relative += data.len() as u64;
        }

        let expected = self.index[key].crc;
        let actual = hasher.finalize();
        if actual != expected {
            warn!(key, expected, actual, "blob checksum mismatch");
        }
        Ok(actual == expected)
    }

    /// Metadata for `key` as the read path sees it.
    pub(crate) fn message_info(&self, key: &str) -> Result<MessageInfo> {
        let Some(entry) = self.index.get(key) else {
            bail!("blob {:?} not found", key);
        };
        let id = BlobId::shared(key)?;
        Ok(MessageInfo::new(id, entry.size, entry.expiration_ms).with_crc(u64::from(entry.crc)))
    }
}
