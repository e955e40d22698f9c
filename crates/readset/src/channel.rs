use bytes::Bytes;
use std::io;
use std::sync::{Mutex, PoisonError};

use crate::ReadError;

/// Completion callback for an asynchronous write. Receives the number of
/// bytes written or the failure.
pub type WriteCallback = Box<dyn FnOnce(Result<u64, ReadError>) + Send>;

/// A sink that accepts whole buffers without blocking the caller.
pub trait AsyncWritableChannel: Send + Sync {
    /// Queues `data` for writing. `callback`, if given, is invoked exactly
    /// once when the write completes or fails.
    fn write(&self, data: Bytes, callback: Option<WriteCallback>);
}

/// In-memory channel that completes every write immediately.
#[derive(Debug, Default)]
pub struct BufferedChannel {
    writes: Mutex<Vec<Bytes>>,
    closed: bool,
}

impl BufferedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel that rejects every write with `BrokenPipe`.
    pub fn closed() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            closed: true,
        }
    }

    /// Buffers written so far, in write order.
    pub fn writes(&self) -> Vec<Bytes> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All written bytes concatenated.
    pub fn contents(&self) -> Vec<u8> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flat_map(|b| b.iter().copied())
            .collect()
    }
}

impl AsyncWritableChannel for BufferedChannel {
    fn write(&self, data: Bytes, callback: Option<WriteCallback>) {
        let result = if self.closed {
            Err(ReadError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "channel is closed",
            )))
        } else {
            let len = data.len() as u64;
            self.writes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(data);
            Ok(len)
        };
        if let Some(cb) = callback {
            cb(result);
        }
    }
}
