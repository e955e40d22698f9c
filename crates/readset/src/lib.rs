//! # ReadSet - bounded blob reads over the segmented log
//!
//! Turns `(Offset, MessageInfo)` pairs into safe reads against the log and
//! batches them for one outbound transfer.
//!
//! * [`BlobReadOptions`] - one blob: validates `offset + size` against the
//!   segment's end offset, holds a segment view until closed, can load its
//!   bytes into memory ([`prefetch`](BlobReadOptions::prefetch)) and can be
//!   persisted ([`to_bytes`](BlobReadOptions::to_bytes)).
//! * [`StoreMessageReadSet`] - many blobs, sorted by offset so that disk
//!   access is sequential. Streams one blob into a [`std::io::Write`] sink, or
//!   pushes every prefetched blob into an [`AsyncWritableChannel`].
//! * [`IoOutcomeHandler`] - notified after every prefetch so that media
//!   errors feed disk-health tracking.
//!
//! ## Checkpoint layout (v1 – current)
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ version: u16 = 1                                         │
//! │ offset:  [version: u16 = 1][name_len: u32][name][u64]    │
//! │ size:    u64                                             │
//! │ expires: i64 (ms, -1 = never)                            │
//! │ key:     store key bytes                                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! v0 (decode only) stores a bare `u64` byte offset instead of the encoded
//! offset; the segment is the log's first one. All integers are big-endian.
//! Account id, container id and checksum are not stored; decoding fills in
//! the "unknown" defaults.
//!
//! ## Version history
//!
//! | Version | Offset field          |
//! |---------|-----------------------|
//! | v0      | `u64`, first segment  |
//! | v1      | full encoded `Offset` |

mod channel;
mod error;
mod format;
mod handler;
mod read_options;
mod read_set;

pub use channel::{AsyncWritableChannel, BufferedChannel, WriteCallback};
pub use error::ReadError;
pub use format::{VERSION_0, VERSION_1};
pub use handler::{IoOutcomeHandler, NoopIoHandler};
pub use read_options::BlobReadOptions;
pub use read_set::StoreMessageReadSet;

#[cfg(test)]
mod tests;
