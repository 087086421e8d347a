//! Behavioral properties of the access layer: blocked writes, local record
//! checks, message classification, key layout, correlation IDs and the
//! read cache.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{connect, end_of_file, item, item_format, items_path, lock, not_found};
use open_mainframe_encoding::CP037;
use open_mainframe_rla::codec::encode_key;
use open_mainframe_rla::{
    AccessConfig, CorrelationIds, DeclaredNames, ErrorKind, FieldDescription, FieldValue, HostConnection,
    HostMessage, MessageType, OpenOptions, Record, RecordFormat, RlaError, Strategy,
};
use proptest::prelude::*;

fn blocked_write(strategy: Strategy, count: usize, blocking: usize) {
    let (host, conn) = connect(strategy, AccessConfig::default(), 0);
    let format = item_format();
    let mut file = conn
        .open_file(&items_path(), Arc::clone(&format), &OpenOptions::write_only().blocking_factor(blocking))
        .unwrap();
    let increment = file.open_feedback().unwrap().record_increment();
    let records: Vec<Record> = (0..count).map(|i| item(&format, &format!("W{:05}", i), i as i64)).collect();
    file.write_all(&records).unwrap();

    let host = lock(&host);
    let mut expected = vec![blocking * increment; count / blocking];
    if count % blocking != 0 {
        expected.push((count % blocking) * increment);
    }
    assert_eq!(host.put_sizes, expected, "N={} B={}", count, blocking);
    assert_eq!(host.count("put"), count.div_ceil(blocking));
    assert_eq!(host.records.len(), count);
}

#[test]
fn writes_are_blocked() {
    for strategy in [Strategy::Native, Strategy::Remote] {
        for (count, blocking) in [(7, 3), (6, 3), (1, 3), (3, 1), (5, 5), (11, 4)] {
            blocked_write(strategy, count, blocking);
        }
    }
}

#[test]
fn large_block_uses_extended_length() {
    let format = Arc::new(RecordFormat::new("WIDEREC").field(FieldDescription::character("DATA", 2000)));
    let host = Arc::new(std::sync::Mutex::new(common::HostState::new(Arc::clone(&format))));
    let conn = HostConnection::new(AccessConfig::default())
        .with_remote(Box::new(common::SimSession::new(Arc::clone(&host))))
        .unwrap();
    let mut file = conn
        .open_file(&items_path(), Arc::clone(&format), &OpenOptions::write_only().blocking_factor(20))
        .unwrap();
    let records: Vec<Record> = (0..20).map(|_| Record::new(Arc::clone(&format))).collect();
    file.write_all(&records).unwrap();
    let host = lock(&host);
    assert_eq!(host.put_sizes.len(), 1);
    assert!(host.put_sizes[0] > 32767);
    assert_eq!(host.records.len(), 20);
}

fn mismatched_lengths_stay_local(strategy: Strategy) {
    let (host, conn) = connect(strategy, AccessConfig::default(), 2);
    let mut file = conn
        .open_file(&items_path(), item_format(), &OpenOptions::read_write())
        .unwrap();
    file.read_first().unwrap();
    lock(&host).clear_log();

    let shorter = Arc::new(RecordFormat::new("ITEMREC").field(FieldDescription::character("SKU", 6)));
    let longer = Arc::new(
        RecordFormat::new("ITEMREC")
            .field(FieldDescription::character("SKU", 6))
            .field(FieldDescription::character("FILLER", 80)),
    );
    let empty = Arc::new(RecordFormat::new("ITEMREC"));
    for format in [shorter, longer, empty] {
        let record = Record::new(format);
        let err = file.write(&record).unwrap_err();
        assert!(matches!(err, RlaError::RecordLengthMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = file.update(&record).unwrap_err();
        assert!(matches!(err, RlaError::RecordLengthMismatch { .. }));
    }

    // One bad record in a batch stops the whole batch.
    let good = item(&item_format(), "G00000", 1);
    let bad = Record::new(Arc::new(RecordFormat::new("ITEMREC").field(FieldDescription::character("SKU", 6))));
    assert!(file.write_all(&[good, bad]).is_err());

    assert!(lock(&host).calls.is_empty());
    assert!(file.is_open());
}

#[test]
fn native_length_mismatch_makes_no_calls() {
    mismatched_lengths_stay_local(Strategy::Native);
}

#[test]
fn remote_length_mismatch_makes_no_calls() {
    mismatched_lengths_stay_local(Strategy::Remote);
}

fn classification(strategy: Strategy) {
    let (host, conn) = connect(strategy, AccessConfig::default(), 2);
    let mut file = conn
        .open_file(&items_path(), item_format(), &OpenOptions::read_only())
        .unwrap();

    lock(&host).fail_next = Some(vec![end_of_file()]);
    assert_eq!(file.read_next().unwrap(), None);

    lock(&host).fail_next = Some(vec![not_found()]);
    assert_eq!(file.position_to_index(1).unwrap(), None);

    // Benign message alongside a diagnostic below escape severity.
    lock(&host).fail_next = Some(vec![
        HostMessage::new("CPF4011", "Informational notice.", 10, MessageType::Diagnostic),
        end_of_file(),
    ]);
    assert_eq!(file.read_next().unwrap(), None);

    let mapping = HostMessage::new("CPF5029", "Data mapping error on member ITEMS.", 30, MessageType::Escape);
    lock(&host).fail_next = Some(vec![mapping.clone()]);
    let err = file.read_next().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Host);
    assert!(!err.is_retryable());
    let messages = err.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, mapping.id);
    assert_eq!(messages[0].text, mapping.text);
    assert_eq!(messages[0].severity, 30);

    // End of file does not hide an escape message that came with it.
    lock(&host).fail_next = Some(vec![end_of_file(), mapping]);
    let err = file.read_next().unwrap_err();
    assert_eq!(err.messages().len(), 2);
    assert_eq!(err.messages()[0].id, "CPF5001");

    // A host error leaves the file usable.
    assert!(file.is_open());
    assert!(file.read_first().unwrap().is_some());
}

#[test]
fn native_message_classification() {
    classification(Strategy::Native);
}

#[test]
fn remote_message_classification() {
    classification(Strategy::Remote);
}

#[test]
fn end_of_file_on_update_is_an_error() {
    let (host, conn) = connect(Strategy::Remote, AccessConfig::default(), 1);
    let mut file = conn
        .open_file(&items_path(), item_format(), &OpenOptions::read_write())
        .unwrap();
    let record = file.read_first().unwrap().unwrap();
    lock(&host).fail_next = Some(vec![end_of_file()]);
    let err = file.update(&record).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Host);
}

#[test]
fn key_padding() {
    let format = RecordFormat::new("KEYREC")
        .field(FieldDescription::hex("ID", 8))
        .field(FieldDescription::character("NAME", 10))
        .field(FieldDescription::varchar("ALIAS", 12))
        .key("ID")
        .key("NAME")
        .key("ALIAS");

    let key = encode_key(&format, &[FieldValue::Bytes(vec![0xAB, 0xCD])], &CP037, true).unwrap();
    assert_eq!(key.bytes, vec![0xAB, 0xCD, 0, 0, 0, 0, 0, 0]);
    assert_eq!(key.field_count, 1);

    let values = [
        FieldValue::Bytes(vec![1; 8]),
        FieldValue::from("ANN"),
        FieldValue::from("AL"),
    ];
    let key = encode_key(&format, &values, &CP037, true).unwrap();
    assert_eq!(key.bytes.len(), 8 + 3 + 2 + 2);
    assert_eq!(&key.bytes[8..11], CP037.encode("ANN").unwrap().as_slice());
    assert_eq!(&key.bytes[11..13], &[0, 2]);
    assert_eq!(key.field_count, 3);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn character_keys_are_never_padded(text in "[A-Z0-9]{1,10}") {
        let format = RecordFormat::new("KEYREC")
            .field(FieldDescription::character("NAME", 10))
            .key("NAME");
        let key = encode_key(&format, &[FieldValue::from(text.as_str())], &CP037, true).unwrap();
        prop_assert_eq!(key.bytes.len(), text.len());
    }

    #[test]
    fn correlation_ids_wrap_without_zero(start in 0u16..=0x7FFE) {
        let ids = CorrelationIds::starting_after(start);
        let mut seen = HashSet::new();
        for _ in 0..0x7FFE {
            let id = ids.next();
            prop_assert!((1..=0x7FFE).contains(&id));
            prop_assert!(seen.insert(id), "{} repeated before a full wrap", id);
        }
        prop_assert_eq!(seen.len(), 0x7FFE);
    }
}

#[test]
fn correlation_ids_wrap_on_the_wire() {
    let format = item_format();
    let mut state = common::HostState::new(Arc::clone(&format));
    state.insert(item(&format, "A00000", 0));
    let host = Arc::new(std::sync::Mutex::new(state));
    let session = common::SimSession::new(Arc::clone(&host));
    let conn = HostConnection::new(AccessConfig::default())
        .with_remote_counters(
            Box::new(session),
            Arc::new(CorrelationIds::starting_after(0x7FFD)),
            Arc::new(DeclaredNames::new()),
        )
        .unwrap();

    let mut file = conn.open_file(&items_path(), format, &OpenOptions::read_only()).unwrap();
    file.read_first().unwrap();
    file.read_next().unwrap();
    let host = lock(&host);
    assert_eq!(host.correlation_ids, vec![0x7FFE, 1, 2]);
    assert!(host.frames_per_request.iter().all(|&n| n == 1));
}

fn boundaries_from_cache(strategy: Strategy) {
    let config = AccessConfig {
        cache_records: true,
        ..AccessConfig::default()
    };
    let (host, conn) = connect(strategy, config, 5);
    let mut file = conn
        .open_file(&items_path(), item_format(), &OpenOptions::read_only().blocking_factor(10))
        .unwrap();
    file.read_first().unwrap();
    lock(&host).clear_log();

    file.position_after_last().unwrap();
    let last = file.read_previous().unwrap().unwrap();
    assert_eq!(last.record_number, 5);
    file.position_before_first().unwrap();
    let first = file.read_next().unwrap().unwrap();
    assert_eq!(first.record_number, 1);
    assert_eq!(file.read_last().unwrap().map(|r| r.record_number), Some(5));
    assert_eq!(file.read_next().unwrap(), None);

    assert!(lock(&host).calls.is_empty());
}

#[test]
fn native_cache_boundaries_make_no_calls() {
    boundaries_from_cache(Strategy::Native);
}

#[test]
fn remote_cache_boundaries_make_no_calls() {
    boundaries_from_cache(Strategy::Remote);
}

#[test]
fn boundary_outside_cache_goes_to_host() {
    let config = AccessConfig {
        cache_records: true,
        ..AccessConfig::default()
    };
    let (host, conn) = connect(Strategy::Native, config, 10);
    let mut file = conn
        .open_file(&items_path(), item_format(), &OpenOptions::read_only().blocking_factor(3))
        .unwrap();
    file.read_first().unwrap();
    lock(&host).clear_log();

    file.position_before_first().unwrap();
    assert!(lock(&host).calls.is_empty());
    file.position_after_last().unwrap();
    assert_eq!(lock(&host).calls, vec!["feod"]);
}
