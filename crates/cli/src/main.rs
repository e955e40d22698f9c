//! # CLI - blob store interactive shell
//!
//! A REPL over [`store::BlobStore`]. Reads commands from stdin, executes them
//! and prints results to stdout. Logs go to stderr so that piped sessions
//! (see `tests/`) only see command output.
//!
//! ## Commands
//!
//! ```text
//! PUT key value [ttl_ms]     Store a blob, optionally expiring after ttl_ms
//! GET key [key ...]          Print blobs in log order
//! CHECKPOINT file key [...]  Save read descriptors for the keys to file
//! RESTORE file               Load a checkpoint and print its blobs
//! STATS                      Print store, disk health and read timings
//! EXIT / QUIT                Shut down
//! ```
//!
//! ## Configuration
//!
//! ```text
//! BLOBSTORE_DATA_DIR             segment directory        (default: "data/blobs")
//! BLOBSTORE_SEGMENT_CAPACITY_KB  segment capacity in KiB  (default: 4096)
//! BLOBSTORE_PREFETCH_KB          prefetch chunk in KiB    (default: 4096)
//! BLOBSTORE_FSYNC                fsync every append       (default: "true")
//! BLOBSTORE_DISK_METRICS         record read timings      (default: "true")
//! BLOBSTORE_HEALTH_ERRORS        errors before unhealthy  (default: 3)
//! RUST_LOG                       log filter               (default: "warn")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! blobstore started (dir=data/blobs, blobs=0, segments=1)
//! > PUT greeting hello
//! OK (0_0:34)
//! > GET greeting
//! greeting -> hello
//! (1 blobs, 5 bytes)
//! > EXIT
//! bye
//! ```

use anyhow::Result;
use config::StoreConfig;
use message::{BlobIdFactory, INFINITE_TIME};
use readset::{BufferedChannel, StoreMessageReadSet};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc;
use store::{now_ms, BlobStore, ReadCheckpoint};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    let config = StoreConfig::from_env();
    debug!(?config, "loaded config");
    let mut store = BlobStore::open(config)?;

    println!(
        "blobstore started (dir={}, blobs={}, segments={})",
        store.config().data_dir.display(),
        store.len(),
        store.log().segment_count()
    );
    println!("Commands: PUT key value [ttl_ms] | GET key... | CHECKPOINT file key... | RESTORE file");
    println!("          STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "PUT" => match (parts.next(), parts.next(), parts.next()) {
                    (Some(k), Some(v), ttl) => {
                        let expiration = match ttl.map(str::parse::<i64>) {
                            None => Ok(INFINITE_TIME),
                            Some(Ok(ttl)) if ttl >= 0 => now_ms().checked_add(ttl).ok_or(()),
                            Some(_) => Err(()),
                        };
                        match expiration {
                            Ok(exp) => match store.put(k, v.as_bytes(), exp) {
                                Ok(offset) => println!("OK {}", offset),
                                Err(e) => println!("ERR put failed: {:#}", e),
                            },
                            Err(()) => println!("ERR ttl_ms must be a non-negative integer that fits the clock"),
                        }
                    }
                    _ => println!("ERR usage: PUT key value [ttl_ms]"),
                },
                "GET" => {
                    let keys: Vec<&str> = parts.collect();
                    if keys.is_empty() {
                        println!("ERR usage: GET key [key ...]");
                    } else {
                        match store.get(&keys, now_ms()) {
                            Ok(mut set) => {
                                if let Err(e) = print_prefetched(&mut set) {
                                    println!("ERR read failed: {:#}", e);
                                }
                            }
                            Err(e) => println!("ERR get failed: {:#}", e),
                        }
                    }
                }
                "CHECKPOINT" => {
                    let file = parts.next();
                    let keys: Vec<&str> = parts.collect();
                    match file {
                        Some(file) if !keys.is_empty() => {
                            let saved = store
                                .get(&keys, now_ms())
                                .and_then(|set| ReadCheckpoint::save(Path::new(file), set.iter()));
                            match saved {
                                Ok(()) => println!("OK ({} descriptors)", keys.len()),
                                Err(e) => println!("ERR checkpoint failed: {:#}", e),
                            }
                        }
                        _ => println!("ERR usage: CHECKPOINT file key [key ...]"),
                    }
                }
                "RESTORE" => {
                    if let Some(file) = parts.next() {
                        match ReadCheckpoint::load(Path::new(file), &BlobIdFactory, store.log()) {
                            Ok(descriptors) => {
                                let set =
                                    StoreMessageReadSet::with_handler(descriptors, store.health().clone());
                                if let Err(e) = print_direct(&set) {
                                    println!("ERR read failed: {:#}", e);
                                }
                            }
                            Err(e) => println!("ERR restore failed: {:#}", e),
                        }
                    } else {
                        println!("ERR usage: RESTORE file");
                    }
                }
                "STATS" => {
                    println!("{:?}", store);
                    let log = store.log();
                    println!(
                        "log: dir={}, capacity={} bytes, segments={}, active={}",
                        log.dir().display(),
                        log.capacity(),
                        log.segment_count(),
                        log.active_segment_name()
                    );
                    println!("{:?}", store.health().snapshot());
                    match store.disk_stats() {
                        Some(stats) => println!(
                            "disk reads: {} (mean {} ms/MiB, max {} ms/MiB)",
                            stats.count,
                            stats.mean_ms_per_mb(),
                            stats.max_ms_per_mb
                        ),
                        None => println!("disk reads: not recorded"),
                    }
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}

/// Prefetches every blob and pushes the set through an in-memory channel.
fn print_prefetched(set: &mut StoreMessageReadSet) -> Result<()> {
    set.prefetch_all()?;

    let channel = BufferedChannel::new();
    let (tx, rx) = mpsc::channel();
    set.write_to_channel(
        &channel,
        Box::new(move |r| {
            let _ = tx.send(r);
        }),
    );
    let last_write = rx.recv()??;

    for (index, data) in channel.writes().iter().enumerate() {
        println!("{} -> {}", set.key_at(index)?.id(), String::from_utf8_lossy(data));
    }
    println!("({} blobs, {} bytes)", set.count(), total_bytes(set)?);
    debug!(last_write, "channel transfer finished");
    Ok(())
}

/// Streams every blob straight from its segment file.
fn print_direct(set: &StoreMessageReadSet) -> Result<()> {
    for index in 0..set.count() {
        let mut out: Vec<u8> = Vec::new();
        set.write_to(index, &mut out, 0, u64::MAX)?;
        println!("{} -> {}", set.key_at(index)?.id(), String::from_utf8_lossy(&out));
    }
    println!("({} blobs)", set.count());
    Ok(())
}

fn total_bytes(set: &StoreMessageReadSet) -> Result<u64> {
    let mut total = 0;
    for index in 0..set.count() {
        total += set.size_in_bytes(index)?;
    }
    Ok(total)
}
