use super::*;
use std::io::Cursor;

// -------------------- BlobId --------------------

#[test]
fn blob_id_encoding_is_length_prefixed() {
    let id = BlobId::new("abc").unwrap();
    assert_eq!(id.to_bytes(), vec![0, 3, b'a', b'b', b'c']);
    assert_eq!(id.size_in_bytes(), 5);
    assert_eq!(id.id(), "abc");
}

#[test]
fn blob_id_rejects_empty_and_oversized() {
    assert!(matches!(BlobId::new(""), Err(KeyError::InvalidLength(0))));
    let huge = "x".repeat(u16::MAX as usize + 1);
    assert!(matches!(BlobId::new(huge), Err(KeyError::InvalidLength(_))));
}

#[test]
fn factory_reads_one_key_and_leaves_the_rest() {
    let mut data = BlobId::new("first").unwrap().to_bytes();
    data.extend_from_slice(&BlobId::new("second").unwrap().to_bytes());
    let mut cursor = Cursor::new(data);

    let a = BlobIdFactory.read_key(&mut cursor).unwrap();
    let b = BlobIdFactory.read_key(&mut cursor).unwrap();
    assert_eq!(a.id(), "first");
    assert_eq!(b.id(), "second");
}

#[test]
fn factory_reports_truncated_key() {
    let mut data = BlobId::new("truncated").unwrap().to_bytes();
    data.truncate(4);
    let err = BlobIdFactory.read_key(&mut Cursor::new(data)).unwrap_err();
    assert!(matches!(err, KeyError::Io(_)));
}

#[test]
fn factory_rejects_invalid_utf8() {
    let data = vec![0, 2, 0xff, 0xfe];
    let err = BlobIdFactory.read_key(&mut Cursor::new(data)).unwrap_err();
    assert!(matches!(err, KeyError::InvalidUtf8));
}

#[test]
fn dyn_keys_compare_by_bytes() {
    let a = BlobId::shared("same").unwrap();
    let b = BlobId::shared("same").unwrap();
    let c = BlobId::shared("other").unwrap();
    assert!(a == b);
    assert!(a != c);
}

// -------------------- MessageInfo --------------------

#[test]
fn message_info_defaults_to_unknown_ids() {
    let info = MessageInfo::new(BlobId::shared("k").unwrap(), 100, INFINITE_TIME);
    assert_eq!(info.size(), 100);
    assert_eq!(info.account_id(), UNKNOWN_ACCOUNT_ID);
    assert_eq!(info.container_id(), UNKNOWN_CONTAINER_ID);
    assert_eq!(info.operation_time_ms(), INFINITE_TIME);
    assert_eq!(info.life_version(), DEFAULT_LIFE_VERSION);
    assert_eq!(info.crc(), None);
}

#[test]
fn message_info_builders_set_fields() {
    let info = MessageInfo::new(BlobId::shared("k").unwrap(), 1, 5_000)
        .with_account(10, 20)
        .with_operation_time(1_234)
        .with_life_version(3)
        .with_crc(0xdead_beef);
    assert_eq!(info.account_id(), 10);
    assert_eq!(info.container_id(), 20);
    assert_eq!(info.operation_time_ms(), 1_234);
    assert_eq!(info.life_version(), 3);
    assert_eq!(info.crc(), Some(0xdead_beef));
}

#[test]
fn expiration() {
    let key = BlobId::shared("k").unwrap();
    let forever = MessageInfo::new(key.clone(), 1, INFINITE_TIME);
    assert!(!forever.is_expired(i64::MAX));

    let ttl = MessageInfo::new(key, 1, 1_000);
    assert!(!ttl.is_expired(999));
    assert!(ttl.is_expired(1_000));
    assert!(ttl.is_expired(2_000));
}
