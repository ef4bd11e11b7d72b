//! Wire round-trip integration tests.
//!
//! Exercises the primitive codec against pinned byte sequences, the
//! container shapes, null erasure, framing enforcement, and a file-backed
//! stream.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::{BufWriter, Cursor, Write};

use tagwire::{Deserializer, Error, Schema, Serializer, Value};

fn empty_schema() -> Schema {
    Schema::builder().build().expect("empty schema builds")
}

fn encode_value(schema: &Schema, value: &Value) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut ser = Serializer::new(&mut bytes, schema);
    ser.write_value(value).expect("encoding should succeed");
    bytes
}

fn decode_value(schema: &Schema, bytes: &[u8]) -> Value {
    let mut cursor = Cursor::new(bytes);
    let mut de = Deserializer::new(&mut cursor, schema);
    let value = de.read_value().expect("decoding should succeed");
    assert_eq!(cursor.position() as usize, bytes.len(), "trailing bytes after read");
    value
}

#[test]
fn primitive_bytes_are_pinned() {
    let schema = empty_schema();
    let mut bytes = Vec::new();
    let mut ser = Serializer::new(&mut bytes, &schema);
    ser.write_bool(true).unwrap();
    ser.write_byte(0x2A).unwrap();
    ser.write_char('X').unwrap();
    ser.write_short(1000).unwrap();
    ser.write_int(12345).unwrap();
    ser.write_long(9_876_543_210).unwrap();
    ser.write_float(3.14).unwrap();
    ser.write_double(2.718_28).unwrap();

    let mut expected = vec![
        0x01, 0x01, // BOOLEAN true
        0x02, 0x2A, // BYTE 42
        0x03, 0x00, 0x58, // CHAR 'X'
        0x04, 0x03, 0xE8, // SHORT 1000
        0x05, 0x00, 0x00, 0x30, 0x39, // INT 12345
        0x06, 0x00, 0x00, 0x00, 0x02, 0x4C, 0xB0, 0x16, 0xEA, // LONG 9876543210
        0x07,
    ];
    expected.extend_from_slice(&3.14f32.to_be_bytes());
    expected.push(0x08);
    expected.extend_from_slice(&2.718_28f64.to_be_bytes());
    assert_eq!(bytes, expected);

    let mut cursor = Cursor::new(bytes);
    let mut de = Deserializer::new(&mut cursor, &schema);
    assert!(de.read_bool().unwrap());
    assert_eq!(de.read_byte().unwrap(), 0x2A);
    assert_eq!(de.read_char().unwrap(), 'X');
    assert_eq!(de.read_short().unwrap(), 1000);
    assert_eq!(de.read_int().unwrap(), 12345);
    assert_eq!(de.read_long().unwrap(), 9_876_543_210);
    assert_eq!(de.read_float().unwrap(), 3.14);
    assert_eq!(de.read_double().unwrap(), 2.718_28);
}

#[test]
fn string_roundtrip_with_length_prefix() {
    let schema = empty_schema();
    let bytes = encode_value(&schema, &Value::Str("hé".to_owned()));
    // STRING tag, 3-byte UTF-8 length, payload.
    assert_eq!(bytes[0], 0x11);
    assert_eq!(&bytes[1..5], &3i32.to_be_bytes());
    assert_eq!(decode_value(&schema, &bytes), Value::Str("hé".to_owned()));
}

#[test]
fn null_writes_exactly_one_byte_and_erases() {
    let schema = empty_schema();
    let bytes = encode_value(&schema, &Value::Null);
    assert_eq!(bytes, vec![0x1A]);

    let mut cursor = Cursor::new(bytes);
    let mut de = Deserializer::new(&mut cursor, &schema);
    assert_eq!(de.read_as::<String>().unwrap(), None);
}

#[test]
fn unit_roundtrip() {
    let schema = empty_schema();
    let bytes = encode_value(&schema, &Value::Unit);
    assert_eq!(bytes, vec![0x19]);
    assert_eq!(decode_value(&schema, &bytes), Value::Unit);
}

#[test]
fn containers_roundtrip() {
    let schema = empty_schema();
    let values = [
        Value::List(vec![Value::Int(1), Value::Null, Value::Str("x".into())]),
        Value::Array(vec![Value::Bool(true), Value::Unit]),
        Value::Seq(vec![Value::Long(-1), Value::Long(2)]),
        Value::pair(Value::Int(1), Value::Str("one".into())),
        Value::triple(Value::Int(1), Value::Int(2), Value::Int(3)),
        Value::entry(Value::Str("k".into()), Value::Double(0.5)),
        Value::Map(vec![
            (Value::Str("a".into()), Value::Int(1)),
            (Value::Str("b".into()), Value::Null),
        ]),
        Value::IntArray(vec![i32::MIN, 0, i32::MAX]),
        Value::ByteArray(vec![-1, 0, 1]),
        Value::CharArray(vec!['a', 'ß', '\u{FFFD}']),
    ];
    for value in values {
        let bytes = encode_value(&schema, &value);
        assert_eq!(decode_value(&schema, &bytes), value);
    }
}

#[test]
fn iterable_has_no_length_prefix() {
    let schema = empty_schema();
    let bytes = encode_value(&schema, &Value::Seq(vec![Value::Bool(false)]));
    // ITERABLE, BOOLEAN false, END_OBJECT.
    assert_eq!(bytes, vec![0x14, 0x01, 0x00, 0x00]);
}

#[test]
fn int_array_packs_elements_without_tags() {
    let schema = empty_schema();
    let bytes = encode_value(&schema, &Value::IntArray(vec![1, 2]));
    let mut expected = vec![0x0D];
    expected.extend_from_slice(&2i32.to_be_bytes());
    expected.extend_from_slice(&1i32.to_be_bytes());
    expected.extend_from_slice(&2i32.to_be_bytes());
    assert_eq!(bytes, expected);
}

#[test]
fn typed_reader_rejects_wrong_tag() {
    let schema = empty_schema();
    let bytes = encode_value(&schema, &Value::Str("no".into()));
    let mut cursor = Cursor::new(bytes);
    let mut de = Deserializer::new(&mut cursor, &schema);
    let err = de.read_int().expect_err("tag mismatch");
    assert!(matches!(err, Error::TypeMismatch { .. }));
}

#[test]
fn truncated_stream_is_a_framing_error() {
    let schema = empty_schema();
    let mut bytes = encode_value(&schema, &Value::Long(7));
    bytes.truncate(4);
    let mut cursor = Cursor::new(bytes);
    let mut de = Deserializer::new(&mut cursor, &schema);
    let err = de.read_value().expect_err("truncated");
    assert!(err.is_framing_error());
}

#[test]
fn unknown_tag_byte_is_a_framing_error() {
    let schema = empty_schema();
    let mut cursor = Cursor::new(vec![0x7Fu8]);
    let mut de = Deserializer::new(&mut cursor, &schema);
    let err = de.read_value().expect_err("unknown tag");
    assert!(err.is_framing_error());
}

#[test]
fn nonnull_fast_path_rejects_null_members() {
    let schema = empty_schema();
    let mut bytes = Vec::new();
    let mut ser = Serializer::new(&mut bytes, &schema);
    let err = ser
        .write_value_nonnull(&Value::List(vec![Value::Null]))
        .expect_err("null member on the fast path");
    assert!(matches!(err, Error::TypeMismatch { .. }));

    // The same list is fine on the default path.
    let mut bytes = Vec::new();
    let mut ser = Serializer::new(&mut bytes, &schema);
    ser.write_value(&Value::List(vec![Value::Null])).unwrap();
}

#[test]
fn char_outside_bmp_is_rejected_at_write() {
    let schema = empty_schema();
    let mut bytes = Vec::new();
    let mut ser = Serializer::new(&mut bytes, &schema);
    let err = ser.write_char('\u{1F600}').expect_err("non-BMP char");
    assert!(matches!(err, Error::TypeMismatch { .. }));
}

#[test]
fn monomorphic_write_covers_builtins() {
    let schema = empty_schema();
    let mut bytes = Vec::new();
    let mut ser = Serializer::new(&mut bytes, &schema);
    ser.write(&42i32).unwrap();
    ser.write(&String::from("hi")).unwrap();
    ser.write(&vec![1i64, 2]).unwrap();
    ser.write(&()).unwrap();

    let mut cursor = Cursor::new(bytes);
    let mut de = Deserializer::new(&mut cursor, &schema);
    assert_eq!(de.read_int().unwrap(), 42);
    assert_eq!(de.read_str().unwrap(), "hi");
    assert_eq!(de.read_as::<Vec<i64>>().unwrap(), Some(vec![1, 2]));
    de.read_unit().unwrap();
}

#[test]
fn unregistered_type_is_a_missing_operation() {
    struct Unregistered;
    let schema = empty_schema();
    let mut bytes = Vec::new();
    let mut ser = Serializer::new(&mut bytes, &schema);
    let err = ser.write(&Unregistered).expect_err("no protocol");
    assert!(matches!(err, Error::MissingOperation(_)));
}

#[test]
fn file_backed_stream_roundtrip() {
    let schema = empty_schema();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("values.bin");

    let value = Value::Map(vec![
        (Value::Str("name".into()), Value::Str("tagwire".into())),
        (Value::Str("version".into()), Value::IntArray(vec![0, 1, 0])),
    ]);

    {
        let file = std::fs::File::create(&path).expect("create file");
        let mut writer = BufWriter::new(file);
        let mut ser = Serializer::new(&mut writer, &schema);
        ser.write_value(&value).unwrap();
        ser.flush().unwrap();
        writer.flush().unwrap();
    }

    let mut file = std::fs::File::open(&path).expect("open file");
    let mut de = Deserializer::new(&mut file, &schema);
    assert_eq!(de.read_value().unwrap(), value);
}
