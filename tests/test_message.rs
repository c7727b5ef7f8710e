/// Field, schema and message container tests

use mdd_channel::{Field, FieldError, FieldType, FieldValue, Message, RawField, Schema, SchemaEntry};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

fn schema() -> Schema {
    Schema::from_entries(vec![
        SchemaEntry::new(3, "DSPLY_NAME", Some(FieldType::String)),
        SchemaEntry::new(6, "TRDPRC_1", Some(FieldType::Double)),
        SchemaEntry::new(16, "TRADE_DATE", Some(FieldType::Date)),
        SchemaEntry::new(22, "BID", Some(FieldType::Double)),
        SchemaEntry::new(25, "ASK", Some(FieldType::Double)),
    ])
}

fn dbl(fid: i32, v: f64) -> RawField {
    RawField::new(fid, FieldValue::Double(v), FieldType::Double)
}

#[test]
fn test_as_double_on_none_field_fails() {
    let f = Field::new(22, "BID", FieldType::None, FieldValue::Empty);
    assert_eq!(f.as_double(), Err(FieldError::Empty { fid: 22 }));
    assert!(f.as_string(0).is_err());
    assert!(f.as_int().is_err());
}

#[test]
fn test_bad_value_is_distinguishable() {
    let f = Field::new(3, "DSPLY_NAME", FieldType::String, FieldValue::Str("IBM".to_string()));
    match f.as_double() {
        Err(FieldError::BadValue { fid, value }) => {
            assert_eq!(fid, 3);
            assert_eq!(value, "IBM");
        }
        other => panic!("expected BadValue, got {:?}", other),
    }
    assert_eq!(f.as_string(0).unwrap(), "IBM");
}

#[test]
fn test_as_string_truncates_decimals() {
    let f = Field::new(22, "BID", FieldType::Double, FieldValue::Double(181.23456));
    assert_eq!(f.as_string(0).unwrap(), "181.23456");
    assert_eq!(f.as_string(2).unwrap(), "181.23");
    assert_eq!(f.as_int().unwrap(), 181);
}

#[test]
fn test_date_is_raw_with_optional_formatting() {
    let f = Field::new(16, "TRADE_DATE", FieldType::Date, FieldValue::Int(20240102));
    assert_eq!(f.as_int().unwrap(), 20240102);
    assert_eq!(f.date_parts(), Some((2024, 1, 2)));
    assert_eq!(f.formatted().as_deref(), Some("2024-01-02"));
}

#[test]
fn test_schema_lookups_never_fail() {
    let s = schema();
    assert_eq!(s.field_id("BID"), 22);
    assert_eq!(s.field_id("NOPE"), 0);
    assert_eq!(s.field_name(9999), "9999");
    assert_eq!(s.field_type(9999), FieldType::None);
    assert_eq!(s.fids(true), vec![3, 6, 16, 22, 25]);
}

#[test]
fn test_deep_copy_survives_set_data() {
    let mut msg = Message::new(Arc::new(schema()));
    msg.set_data("svc", "IBM", 7, 100.0, vec![dbl(22, 1.5)]);
    let copy = msg.field_owned(22).unwrap();

    msg.set_data("svc", "IBM", 7, 101.0, vec![dbl(22, 2.5)]);
    assert_eq!(copy.as_double().unwrap(), 1.5);
    assert_eq!(msg.field(22).unwrap().as_double().unwrap(), 2.5);
    assert_eq!(msg.user_arg(), 7);
}

#[test]
fn test_active_after_error_and_revival() {
    let mut msg = Message::new(Arc::new(schema()));
    msg.set_error("svc", "IBM", 0, 100.0, "Unknown ticker");
    assert!(!msg.is_active());
    assert!(msg.is_dead());

    msg.set_data("svc", "IBM", 0, 101.0, vec![dbl(22, 1.0)]);
    assert!(msg.is_active());
    assert_eq!(msg.error(), "");
}

#[test]
fn test_image_flag_cleared_by_rebuild() {
    let mut msg = Message::new(Arc::new(schema()));
    msg.set_data("svc", "IBM", 0, 100.0, vec![dbl(22, 1.0)]).set_image(true);
    assert!(msg.is_image());

    msg.set_data("svc", "IBM", 0, 101.0, vec![dbl(22, 2.0)]);
    assert!(!msg.is_image());
}

#[test]
fn test_iteration() {
    let mut msg = Message::new(Arc::new(schema()));
    msg.set_data("svc", "IBM", 0, 100.0, vec![dbl(22, 1.0), dbl(25, 2.0)]);
    msg.reset();
    let mut fids = Vec::new();
    while let Some(f) = msg.advance() {
        fids.push(f.fid());
    }
    assert_eq!(fids, vec![22, 25]);
    assert!(msg.current().is_none());
}

#[test]
fn test_dump_and_msg_time() {
    let mut msg = Message::new(Arc::new(schema()));
    // 2024-01-02 10:00:00.250 UTC
    msg.set_data("svc", "IBM", 0, 1_704_189_600.25, vec![dbl(22, 181.5)]);
    assert_eq!(msg.msg_time(), "2024-01-02 10:00:00.250");
    assert_eq!(msg.dump(false), "   [0022] BID            : 181.5");
    assert_eq!(msg.dump(true), "   [0022] BID            (DOUBLE) : 181.5");
}

proptest! {
    #[test]
    fn prop_last_occurrence_wins(batch in prop::collection::vec((1i32..20, -1e6f64..1e6), 0..64)) {
        let mut msg = Message::new(Arc::new(schema()));
        msg.set_data("svc", "IBM", 0, 1.0, batch.iter().map(|&(fid, v)| dbl(fid, v)));

        let mut last: HashMap<i32, f64> = HashMap::new();
        for &(fid, v) in &batch {
            last.insert(fid, v);
        }
        prop_assert_eq!(msg.num_fields(), last.len());
        for (fid, v) in last {
            prop_assert_eq!(msg.field(fid).unwrap().as_double().unwrap(), v);
        }
    }

    #[test]
    fn prop_schema_round_trip(names in prop::collection::hash_set("[A-Z][A-Z_]{2,12}", 1..32)) {
        let entries: Vec<SchemaEntry> = names
            .iter()
            .enumerate()
            .map(|(i, n)| SchemaEntry::new(i as i32 + 1, n.as_str(), None))
            .collect();
        let s = Schema::from_entries(entries);
        for fid in s.fids(false) {
            prop_assert_eq!(s.field_id(&s.field_name(fid)), fid);
        }
    }

    #[test]
    fn prop_numeric_string_shortcut(fid in any::<i32>().prop_filter("nonzero", |f| *f != 0)) {
        // a name table that would resolve the string differently
        let s = Schema::from_entries(vec![SchemaEntry::new(1, fid.to_string(), None)]);
        prop_assert_eq!(s.field_id(&fid.to_string()), fid);
    }
}
