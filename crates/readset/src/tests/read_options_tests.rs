use super::doubles::*;
use crate::*;
use anyhow::Result;
use byteorder::{BigEndian, WriteBytesExt};
use message::{
    BlobId, BlobIdFactory, MessageInfo, StoreKey, DEFAULT_LIFE_VERSION, INFINITE_TIME,
    UNKNOWN_ACCOUNT_ID, UNKNOWN_CONTAINER_ID,
};
use segment::{LogSegmentName, Offset, SegmentError};
use std::io::Cursor;
use std::sync::Arc;
use std::thread;

// -------------------- Construction --------------------

#[test]
fn construction_acquires_one_view() -> Result<()> {
    let (log, seg) = MockLog::single(1_000);
    let opts = BlobReadOptions::new(&log, at(100), info("blob", 200))?;

    assert_eq!(seg.acquired(), 1);
    assert_eq!(seg.released(), 0);
    assert!(opts.is_open());
    assert_eq!(opts.segment_name(), &LogSegmentName::first());
    assert_eq!(opts.offset(), 100);
    assert_eq!(opts.message_info().size(), 200);
    assert_eq!(opts.file_path(), std::path::Path::new("/mock/0_0_log"));
    assert!(opts.prefetched_data().is_none());
    Ok(())
}

#[test]
fn blob_ending_exactly_at_segment_end_is_valid() -> Result<()> {
    let (log, _seg) = MockLog::single(300);
    BlobReadOptions::new(&log, at(100), info("edge", 200))?;
    Ok(())
}

#[test]
fn out_of_range_fails_without_acquiring_a_view() {
    let (log, seg) = MockLog::single(300);
    let err = BlobReadOptions::new(&log, at(101), info("over", 200)).unwrap_err();

    match err {
        ReadError::InvalidRange {
            offset,
            size,
            end_offset,
        } => {
            assert_eq!(offset, at(101));
            assert_eq!(size, 200);
            assert_eq!(end_offset, 300);
        }
        other => panic!("expected InvalidRange, got {:?}", other),
    }
    assert_eq!(seg.acquired(), 0);
}

#[test]
fn overflowing_range_is_invalid() {
    let (log, seg) = MockLog::single(300);
    let err = BlobReadOptions::new(&log, at(u64::MAX - 1), info("wrap", 10)).unwrap_err();
    assert!(matches!(err, ReadError::InvalidRange { .. }));
    assert_eq!(seg.acquired(), 0);
}

#[test]
fn unknown_segment_is_reported() {
    let (log, _seg) = MockLog::single(300);
    let offset = Offset::new(LogSegmentName::new(5, 0), 0);
    let err = BlobReadOptions::new(&log, offset, info("lost", 1)).unwrap_err();
    assert!(matches!(
        err,
        ReadError::Segment(SegmentError::UnknownSegment(name)) if name == LogSegmentName::new(5, 0)
    ));
}

// -------------------- Close --------------------

#[test]
fn close_releases_view_exactly_once() -> Result<()> {
    let (log, seg) = MockLog::single(1_000);
    let opts = BlobReadOptions::new(&log, at(0), info("k", 10))?;

    for _ in 0..5 {
        opts.close();
    }
    assert!(!opts.is_open());
    assert_eq!(seg.released(), 1);

    drop(opts);
    assert_eq!(seg.released(), 1);
    Ok(())
}

#[test]
fn drop_releases_view() -> Result<()> {
    let (log, seg) = MockLog::single(1_000);
    {
        let _opts = BlobReadOptions::new(&log, at(0), info("k", 10))?;
        assert_eq!(seg.outstanding(), 1);
    }
    assert_eq!(seg.outstanding(), 0);
    Ok(())
}

#[test]
fn concurrent_close_releases_once() -> Result<()> {
    let (log, seg) = MockLog::single(1_000);
    let opts = Arc::new(BlobReadOptions::new(&log, at(0), info("k", 10))?);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let opts = opts.clone();
            thread::spawn(move || opts.close())
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(seg.released(), 1);
    Ok(())
}

// -------------------- Ordering --------------------

#[test]
fn ordering_follows_offsets() -> Result<()> {
    let mut log = MockLog::new();
    log.add_segment(LogSegmentName::new(0, 0), 1_000);
    log.add_segment(LogSegmentName::new(1, 0), 1_000);

    let late = BlobReadOptions::new(&log, Offset::new(LogSegmentName::new(1, 0), 0), info("a", 1))?;
    let early = BlobReadOptions::new(&log, at(900), info("b", 1))?;
    let same = BlobReadOptions::new(&log, at(900), info("c", 1))?;

    assert!(early < late);
    assert_eq!(early.cmp(&same), std::cmp::Ordering::Equal);
    Ok(())
}

// -------------------- Encoding --------------------

#[test]
fn encoding_layout_is_version_one() -> Result<()> {
    let (log, _seg) = MockLog::single(1_000);
    let opts = BlobReadOptions::new(&log, at(7), info("abc", 9))?;
    let bytes = opts.to_bytes();

    let mut expected = Vec::new();
    expected.write_u16::<BigEndian>(VERSION_1)?;
    expected.extend_from_slice(&at(7).to_bytes());
    expected.write_u64::<BigEndian>(9)?;
    expected.write_i64::<BigEndian>(INFINITE_TIME)?;
    expected.extend_from_slice(&BlobId::new("abc")?.to_bytes());
    assert_eq!(bytes, expected);
    Ok(())
}

#[test]
fn round_trip_keeps_location_and_resets_ids() -> Result<()> {
    let mut log = MockLog::new();
    log.add_segment(LogSegmentName::new(0, 0), 100);
    let seg = log.add_segment(LogSegmentName::new(3, 2), 5_000);

    let original_info = MessageInfo::new(BlobId::shared("round-trip")?, 1_234, 99_000)
        .with_account(12, 34)
        .with_life_version(5)
        .with_crc(77);
    let offset = Offset::new(LogSegmentName::new(3, 2), 2_000);
    let original = BlobReadOptions::new(&log, offset, original_info)?;

    let bytes = original.to_bytes();
    let decoded = BlobReadOptions::from_reader(&mut Cursor::new(bytes), &BlobIdFactory, &log)?;

    assert_eq!(decoded.position(), &offset);
    let info = decoded.message_info();
    assert_eq!(info.size(), 1_234);
    assert_eq!(info.expiration_time_ms(), 99_000);
    assert_eq!(info.store_key().id(), "round-trip");
    assert_eq!(info.account_id(), UNKNOWN_ACCOUNT_ID);
    assert_eq!(info.container_id(), UNKNOWN_CONTAINER_ID);
    assert_eq!(info.life_version(), DEFAULT_LIFE_VERSION);
    assert_eq!(info.crc(), None);

    // Each descriptor holds its own view.
    assert_eq!(seg.outstanding(), 2);
    Ok(())
}

fn legacy_bytes(offset: u64, size: u64, expires: i64, key: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u16::<BigEndian>(VERSION_0).unwrap();
    buf.write_u64::<BigEndian>(offset).unwrap();
    buf.write_u64::<BigEndian>(size).unwrap();
    buf.write_i64::<BigEndian>(expires).unwrap();
    buf.extend_from_slice(&BlobId::new(key).unwrap().to_bytes());
    buf
}

#[test]
fn legacy_version_binds_to_first_segment() -> Result<()> {
    let mut log = MockLog::new();
    let first = log.add_segment(LogSegmentName::new(0, 0), 10_000);
    let later = log.add_segment(LogSegmentName::new(1, 0), 10_000);

    let bytes = legacy_bytes(4_096, 512, 1_700_000_000_000, "legacy-key");
    let decoded = BlobReadOptions::from_reader(&mut Cursor::new(bytes), &BlobIdFactory, &log)?;

    assert_eq!(decoded.position(), &Offset::new(LogSegmentName::new(0, 0), 4_096));
    let info = decoded.message_info();
    assert_eq!(info.size(), 512);
    assert_eq!(info.expiration_time_ms(), 1_700_000_000_000);
    assert_eq!(info.store_key().id(), "legacy-key");
    assert_eq!(info.account_id(), UNKNOWN_ACCOUNT_ID);
    assert_eq!(info.container_id(), UNKNOWN_CONTAINER_ID);
    assert_eq!(info.life_version(), 0);

    assert_eq!(first.acquired(), 1);
    assert_eq!(later.acquired(), 0);
    Ok(())
}

#[test]
fn legacy_version_on_empty_log_fails() {
    let log = MockLog::new();
    let bytes = legacy_bytes(0, 1, INFINITE_TIME, "k");
    let err = BlobReadOptions::from_reader(&mut Cursor::new(bytes), &BlobIdFactory, &log).unwrap_err();
    assert!(matches!(err, ReadError::Segment(SegmentError::EmptyLog)));
}

#[test]
fn unknown_version_is_a_format_error() {
    let (log, seg) = MockLog::single(1_000);
    let mut bytes = legacy_bytes(0, 1, INFINITE_TIME, "k");
    bytes[0..2].copy_from_slice(&2u16.to_be_bytes());

    let err = BlobReadOptions::from_reader(&mut Cursor::new(bytes), &BlobIdFactory, &log).unwrap_err();
    assert!(matches!(err, ReadError::UnknownVersion(2)));
    assert!(err.is_format_error());
    assert!(!err.is_media_failure());
    assert_eq!(seg.acquired(), 0);
}

#[test]
fn decoded_range_is_still_bounds_checked() {
    let (log, seg) = MockLog::single(100);
    let bytes = legacy_bytes(90, 20, INFINITE_TIME, "k");
    let err = BlobReadOptions::from_reader(&mut Cursor::new(bytes), &BlobIdFactory, &log).unwrap_err();
    assert!(matches!(err, ReadError::InvalidRange { .. }));
    assert_eq!(seg.acquired(), 0);
}

#[test]
fn truncated_encoding_is_an_error() -> Result<()> {
    let (log, _seg) = MockLog::single(1_000);
    let opts = BlobReadOptions::new(&log, at(0), info("truncate-me", 10))?;
    let bytes = opts.to_bytes();
    let cut = &bytes[..bytes.len() - 4];
    assert!(BlobReadOptions::from_reader(&mut Cursor::new(cut), &BlobIdFactory, &log).is_err());
    Ok(())
}

#[test]
fn several_descriptors_decode_from_one_stream() -> Result<()> {
    let (log, _seg) = MockLog::single(1_000);
    let a = BlobReadOptions::new(&log, at(0), info("a", 10))?;
    let b = BlobReadOptions::new(&log, at(10), info("b", 20))?;

    let mut stream = a.to_bytes();
    stream.extend_from_slice(&b.to_bytes());
    let mut cursor = Cursor::new(stream);

    let da = BlobReadOptions::from_reader(&mut cursor, &BlobIdFactory, &log)?;
    let db = BlobReadOptions::from_reader(&mut cursor, &BlobIdFactory, &log)?;
    assert_eq!(da.message_info().store_key().id(), "a");
    assert_eq!(db.offset(), 10);
    assert_eq!(db.message_info().size(), 20);
    Ok(())
}

// -------------------- Prefetch --------------------

#[test]
fn prefetch_reads_the_requested_window() -> Result<()> {
    let (log, _seg) = MockLog::single(1_000);
    let mut opts = BlobReadOptions::new(&log, at(100), info("k", 50))?;

    opts.prefetch(10, 20)?;
    let data = opts.prefetched_data().unwrap();
    let expected: Vec<u8> = (110..130u64).map(|i| i as u8).collect();
    assert_eq!(data.as_ref(), expected.as_slice());
    assert_eq!(opts.prefetched_relative_offset(), Some(10));
    Ok(())
}

#[test]
fn prefetch_is_clamped_to_the_blob() -> Result<()> {
    let (log, _seg) = MockLog::single(1_000);
    let mut opts = BlobReadOptions::new(&log, at(0), info("k", 100))?;

    opts.prefetch(90, 50)?;
    assert_eq!(opts.prefetched_data().unwrap().len(), 10);
    Ok(())
}

#[test]
fn prefetch_replaces_previous_buffer() -> Result<()> {
    let (log, _seg) = MockLog::single(1_000);
    let mut opts = BlobReadOptions::new(&log, at(0), info("k", 100))?;

    opts.prefetch(0, 10)?;
    opts.prefetch(50, 10)?;
    assert_eq!(opts.prefetched_relative_offset(), Some(50));
    assert_eq!(opts.prefetched_data().unwrap()[0], 50);
    Ok(())
}

#[test]
fn short_read_is_an_io_failure() -> Result<()> {
    let (log, seg) = MockLog::single(1_000);
    let mut opts = BlobReadOptions::new(&log, at(200), info("k", 100))?;
    seg.file.set_behaviour(ReadBehaviour::Short(40));

    let err = opts.prefetch(0, 100).unwrap_err();
    match &err {
        ReadError::IoFailure {
            path,
            offset,
            expected,
            actual,
        } => {
            assert_eq!(path, &std::path::PathBuf::from("/mock/0_0_log"));
            assert_eq!(*offset, 200);
            assert_eq!(*expected, 100);
            assert_eq!(*actual, 40);
        }
        other => panic!("expected IoFailure, got {:?}", other),
    }
    let msg = err.to_string();
    assert!(msg.starts_with("Input/output error"), "{}", msg);
    assert!(msg.contains("/mock/0_0_log"));
    assert!(err.is_media_failure());
    assert!(err.is_retryable());
    assert!(opts.prefetched_data().is_none());
    Ok(())
}

#[test]
fn prefetch_past_blob_end_is_a_logic_error() -> Result<()> {
    let (log, seg) = MockLog::single(1_000);
    let mut opts = BlobReadOptions::new(&log, at(0), info("k", 100))?;

    let err = opts.prefetch(101, 1).unwrap_err();
    assert!(matches!(
        err,
        ReadError::RangeOutsideBlob {
            relative_offset: 101,
            size: 100
        }
    ));
    assert!(!err.is_media_failure());
    assert_eq!(seg.file.reads(), 0);
    Ok(())
}

#[test]
fn prefetch_after_close_is_rejected() -> Result<()> {
    let (log, seg) = MockLog::single(1_000);
    let mut opts = BlobReadOptions::new(&log, at(0), info("k", 100))?;
    opts.close();

    let err = opts.prefetch(0, 100).unwrap_err();
    assert!(matches!(err, ReadError::Closed(_)));
    assert_eq!(seg.file.reads(), 0);
    Ok(())
}

#[test]
fn prefetched_data_survives_close() -> Result<()> {
    let (log, _seg) = MockLog::single(1_000);
    let mut opts = BlobReadOptions::new(&log, at(0), info("k", 8))?;
    opts.prefetch(0, 8)?;
    opts.close();
    assert_eq!(opts.prefetched_data().unwrap().len(), 8);
    Ok(())
}

#[test]
fn prefetch_records_disk_metrics() -> Result<()> {
    let (log, _seg) = MockLog::single(1_000);
    let log = log.with_metrics();
    let mut opts = BlobReadOptions::new(&log, at(0), info("k", 100))?;

    opts.prefetch(0, 100)?;
    opts.prefetch(0, 50)?;
    assert_eq!(log.metrics.as_ref().unwrap().snapshot().count, 2);
    Ok(())
}

#[test]
fn empty_prefetch_skips_metrics() -> Result<()> {
    let (log, _seg) = MockLog::single(1_000);
    let log = log.with_metrics();
    let mut opts = BlobReadOptions::new(&log, at(0), info("k", 100))?;

    opts.prefetch(100, 10)?;
    assert_eq!(opts.prefetched_data().unwrap().len(), 0);
    assert_eq!(log.metrics.as_ref().unwrap().snapshot().count, 0);
    Ok(())
}

#[test]
fn failed_prefetch_records_no_metrics() -> Result<()> {
    let (log, seg) = MockLog::single(1_000);
    let log = log.with_metrics();
    let mut opts = BlobReadOptions::new(&log, at(0), info("k", 100))?;
    seg.file.set_behaviour(ReadBehaviour::Short(1));

    assert!(opts.prefetch(0, 100).is_err());
    assert_eq!(log.metrics.as_ref().unwrap().snapshot().count, 0);
    Ok(())
}
