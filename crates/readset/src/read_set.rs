use bytes::Bytes;
use message::SharedKey;
use std::io::Write;
use std::sync::Arc;
use tracing::trace;

use crate::{AsyncWritableChannel, BlobReadOptions, IoOutcomeHandler, NoopIoHandler, ReadError, WriteCallback};

/// A batch of blobs to transfer, ordered by their position in the log.
///
/// The descriptors are sorted once at construction; every index refers to
/// that order. The set owns its descriptors and closes them when dropped.
/// The [`IoOutcomeHandler`] is shared with the caller.
pub struct StoreMessageReadSet {
    read_options: Vec<BlobReadOptions>,
    handler: Arc<dyn IoOutcomeHandler>,
}

impl std::fmt::Debug for StoreMessageReadSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreMessageReadSet")
            .field("read_options", &self.read_options)
            .finish()
    }
}

impl StoreMessageReadSet {
    /// Builds a set that reports prefetch outcomes nowhere.
    pub fn new(read_options: Vec<BlobReadOptions>) -> Self {
        Self::with_handler(read_options, Arc::new(NoopIoHandler))
    }

    /// Builds a set that reports prefetch outcomes to `handler`.
    ///
    /// `read_options` is stable-sorted by offset so that reads walk the log
    /// sequentially.
    pub fn with_handler(mut read_options: Vec<BlobReadOptions>, handler: Arc<dyn IoOutcomeHandler>) -> Self {
        read_options.sort();
        Self {
            read_options,
            handler,
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.read_options.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_options.is_empty()
    }

    /// Descriptor at `index` in offset order.
    pub fn read_options(&self, index: usize) -> Result<&BlobReadOptions, ReadError> {
        self.read_options
            .get(index)
            .ok_or(ReadError::IndexOutOfBounds {
                index,
                size: self.read_options.len(),
            })
    }

    /// Descriptors in offset order.
    pub fn iter(&self) -> impl Iterator<Item = &BlobReadOptions> {
        self.read_options.iter()
    }

    /// Size of the blob at `index`.
    pub fn size_in_bytes(&self, index: usize) -> Result<u64, ReadError> {
        Ok(self.read_options(index)?.message_info().size())
    }

    /// Key of the blob at `index`.
    pub fn key_at(&self, index: usize) -> Result<SharedKey, ReadError> {
        Ok(self.read_options(index)?.message_info().store_key().clone())
    }

    /// Absolute path of the segment file the blob at `index` is read from.
    ///
    /// Relative segment paths are resolved against the current directory.
    pub fn data_source(&self, index: usize) -> Result<String, ReadError> {
        let path = self.read_options(index)?.file_path();
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Ok(absolute.display().to_string())
    }

    /// Prefetched bytes of the blob at `index`, if any.
    pub fn prefetched_data(&self, index: usize) -> Result<Option<Bytes>, ReadError> {
        Ok(self.read_options(index)?.prefetched_data().cloned())
    }

    /// Writes up to `max_size` bytes of the blob at `index`, starting
    /// `relative_offset` bytes into it, to `sink`. Returns the bytes written.
    ///
    /// Serves from the prefetched buffer when there is one, otherwise copies
    /// straight from the segment file.
    ///
    /// # Errors
    ///
    /// * [`ReadError::IndexOutOfBounds`] for a bad `index`.
    /// * [`ReadError::RangeOutsideBlob`] if `relative_offset` is past the blob.
    /// * [`ReadError::OutsidePrefetched`] if the requested range is not
    ///   covered by the prefetched buffer.
    /// * [`ReadError::Closed`] for a direct read after close.
    /// * [`ReadError::Io`] if the file or the sink fail.
    pub fn write_to(
        &self,
        index: usize,
        sink: &mut dyn Write,
        relative_offset: u64,
        max_size: u64,
    ) -> Result<u64, ReadError> {
        let options = self.read_options(index)?;
        let blob_size = options.message_info().size();
        let remaining = blob_size
            .checked_sub(relative_offset)
            .ok_or(ReadError::RangeOutsideBlob {
                relative_offset,
                size: blob_size,
            })?;
        let size_to_read = max_size.min(remaining);

        let written = match (options.prefetched_data(), options.prefetched_relative_offset()) {
            (Some(data), Some(base)) => {
                let outside = || ReadError::OutsidePrefetched {
                    relative_offset,
                    len: size_to_read,
                    base,
                    prefetched: data.len() as u64,
                };
                let start = relative_offset.checked_sub(base).ok_or_else(outside)?;
                let end = start + size_to_read;
                if end > data.len() as u64 {
                    return Err(outside());
                }
                sink.write_all(&data[start as usize..end as usize])?;
                size_to_read
            }
            _ => {
                if !options.is_open() {
                    return Err(ReadError::Closed(*options.position()));
                }
                let start_offset = options.offset() + relative_offset;
                trace!(position = start_offset, count = size_to_read, "blob message read set");
                options.file().transfer_to(start_offset, size_to_read, sink)?
            }
        };

        trace!(
            written,
            file = %options.file_path().display(),
            "written bytes to the write channel"
        );
        Ok(written)
    }

    /// Pushes every prefetched blob, in offset order, into `channel`.
    ///
    /// Only the write of the **last** blob carries `callback`; the earlier
    /// writes are issued without one, so a failure among them is never
    /// reported. If a blob was not prefetched the transfer stops there and
    /// `callback` receives [`ReadError::NotPrefetched`]. An empty set completes
    /// `callback` immediately with `Ok(0)`.
    pub fn write_to_channel(&self, channel: &dyn AsyncWritableChannel, callback: WriteCallback) {
        let Some(last) = self.read_options.len().checked_sub(1) else {
            callback(Ok(0));
            return;
        };

        let mut callback = Some(callback);
        for (index, options) in self.read_options.iter().enumerate() {
            let Some(data) = options.prefetched_data() else {
                if let Some(cb) = callback.take() {
                    cb(Err(ReadError::NotPrefetched { index }));
                }
                return;
            };
            if index == last {
                channel.write(data.clone(), callback.take());
            } else {
                channel.write(data.clone(), None);
            }
        }
    }

    /// Prefetches part of the blob at `index` and reports the outcome to the
    /// handler: `on_success` on success, `on_error` only for media failures.
    /// The error, if any, is returned either way.
    pub fn prefetch(&mut self, index: usize, relative_offset: u64, size: u64) -> Result<(), ReadError> {
        let count = self.read_options.len();
        let options = self
            .read_options
            .get_mut(index)
            .ok_or(ReadError::IndexOutOfBounds { index, size: count })?;

        match options.prefetch(relative_offset, size) {
            Ok(()) => {
                self.handler.on_success();
                Ok(())
            }
            Err(e) => {
                if e.is_media_failure() {
                    self.handler.on_error();
                }
                Err(e)
            }
        }
    }

    /// Prefetches every blob in full, in offset order. Stops at the first
    /// failure.
    pub fn prefetch_all(&mut self) -> Result<(), ReadError> {
        for index in 0..self.read_options.len() {
            let size = self.read_options[index].message_info().size();
            self.prefetch(index, 0, size)?;
        }
        Ok(())
    }

    /// Closes every descriptor, releasing their segment views.
    pub fn close(&self) {
        for options in &self.read_options {
            options.close();
        }
    }
}
