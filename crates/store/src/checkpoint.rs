//! # Read checkpoint
//!
//! Persists a batch of read descriptors so that a transfer can be resumed
//! after a restart.
//!
//! ## File Format
//!
//! ```text
//! ┌──────────────────────┐
//! │ magic: u32 = "RCP1"  │
//! │ count: u32           │
//! ├──────────────────────┤  repeated `count` times
//! │ len: u32             │
//! │ descriptor bytes     │  (BlobReadOptions::to_bytes)
//! ├──────────────────────┤
//! │ crc32: u32           │  over everything above
//! └──────────────────────┘
//! ```
//!
//! All integers are big-endian.
//!
//! ## Crash Safety
//!
//! Written to `<path>.tmp`, fsynced, then renamed over `path`. If the rename
//! fails the file is overwritten in place.

use anyhow::{bail, ensure, Context, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use message::StoreKeyFactory;
use readset::BlobReadOptions;
use segment::Log;
use std::fs::{self, OpenOptions};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// `"RCP1"` in ASCII.
pub const CHECKPOINT_MAGIC: u32 = 0x5243_5031;

/// Reads and writes checkpoint files.
pub struct ReadCheckpoint;

impl ReadCheckpoint {
    /// Writes `descriptors` to `path`, replacing any previous checkpoint.
    pub fn save<'a, I>(path: &Path, descriptors: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a BlobReadOptions>,
    {
        let entries: Vec<Vec<u8>> = descriptors.into_iter().map(|d| d.to_bytes()).collect();

        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(CHECKPOINT_MAGIC)?;
        buf.write_u32::<BigEndian>(entries.len() as u32)?;
        for entry in &entries {
            buf.write_u32::<BigEndian>(entry.len() as u32)?;
            buf.extend_from_slice(entry);
        }
        let crc = crc32fast::hash(&buf);
        buf.write_u32::<BigEndian>(crc)?;

        let tmp_path = tmp_path_for(path);
        write_synced(&tmp_path, &buf)?;
        if fs::rename(&tmp_path, path).is_err() {
            write_synced(path, &buf)?;
            let _ = fs::remove_file(&tmp_path);
        }

        debug!(path = %path.display(), entries = entries.len(), "saved read checkpoint");
        Ok(())
    }

    /// Loads every descriptor in `path` and binds it to `log`.
    ///
    /// # Errors
    ///
    /// Fails on a bad magic number, a checksum mismatch, trailing bytes, or
    /// any descriptor that no longer fits its segment.
    pub fn load(path: &Path, factory: &dyn StoreKeyFactory, log: &dyn Log) -> Result<Vec<BlobReadOptions>> {
        let raw = fs::read(path)
            .with_context(|| format!("failed to read checkpoint at {}", path.display()))?;
        ensure!(raw.len() >= 12, "checkpoint {} is too short", path.display());

        let (body, trailer) = raw.split_at(raw.len() - 4);
        let stored = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = crc32fast::hash(body);
        if stored != actual {
            bail!(
                "checkpoint {} checksum mismatch: stored {:#010x}, computed {:#010x}",
                path.display(),
                stored,
                actual
            );
        }

        let mut cur = Cursor::new(body);
        let magic = cur.read_u32::<BigEndian>()?;
        ensure!(magic == CHECKPOINT_MAGIC, "bad checkpoint magic {:#010x}", magic);
        let count = cur.read_u32::<BigEndian>()?;

        let mut descriptors = Vec::with_capacity((count as usize).min(1024));
        for i in 0..count {
            let len = cur.read_u32::<BigEndian>()? as usize;
            let mut entry = vec![0u8; len];
            cur.read_exact(&mut entry)
                .with_context(|| format!("checkpoint entry {} is truncated", i))?;
            let options = BlobReadOptions::from_reader(&mut Cursor::new(entry), factory, log)
                .with_context(|| format!("failed to decode checkpoint entry {}", i))?;
            descriptors.push(options);
        }
        ensure!(
            cur.position() == body.len() as u64,
            "checkpoint {} has trailing bytes",
            path.display()
        );

        debug!(path = %path.display(), entries = descriptors.len(), "loaded read checkpoint");
        Ok(descriptors)
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_synced(path: &Path, buf: &[u8]) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("failed to open checkpoint at {}", path.display()))?;
    f.write_all(buf)?;
    f.flush()?;
    f.sync_all()?;
    Ok(())
}
