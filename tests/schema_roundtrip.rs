//! Schema self-serialization integration tests.
//!
//! A schema travels over its own wire format: protocol records plus
//! `FUNCTION` payloads produced by an external opaque codec. Here the codec
//! is a registry keyed by op identity, which is how an embedding that knows
//! its ops ahead of time would implement the hook.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::any::Any;
use std::io::Cursor;

use tagwire::{
    Deserializer, Error, Obj, OpaqueCodec, ReadOp, Schema, Serializer, Upcast, WriteOp,
};

#[derive(Debug, Clone, PartialEq)]
struct SerializableData {
    tag: String,
    payload: Vec<i64>,
}

fn data_schema() -> Schema {
    let mut builder = Schema::builder();
    builder
        .define::<SerializableData>("SerializableData")
        .write(|ser, data| {
            ser.write_str(&data.tag)?;
            ser.write(&data.payload)
        })
        .read(|de| {
            Ok(SerializableData {
                tag: de.read_str()?,
                payload: de.read_as::<Vec<i64>>()?.unwrap_or_default(),
            })
        });
    builder.build().expect("data schema builds")
}

/// An opaque codec that recognizes the ops of a reference schema and
/// encodes each as a stable registry key.
struct RegistryCodec {
    reads: Vec<(String, ReadOp)>,
    writes: Vec<(String, WriteOp)>,
    upcasts: Vec<(String, Upcast)>,
}

impl RegistryCodec {
    fn for_schema(schema: &Schema) -> Self {
        let mut reads = Vec::new();
        let mut writes = Vec::new();
        let upcasts = Vec::new();
        for protocol in schema.protocols() {
            if let Some(read) = protocol.read_op() {
                reads.push((format!("{}#read", protocol.name()), read.clone()));
            }
            if let Some(write) = protocol.write_op() {
                writes.push((format!("{}#write", protocol.name()), write.clone()));
            }
        }
        Self { reads, writes, upcasts }
    }
}

impl OpaqueCodec for RegistryCodec {
    fn encode(&self, value: &dyn Any) -> tagwire::Result<Vec<u8>> {
        if let Some(op) = value.downcast_ref::<ReadOp>() {
            if let Some((key, _)) = self.reads.iter().find(|(_, known)| known == op) {
                return Ok(key.clone().into_bytes());
            }
        }
        if let Some(op) = value.downcast_ref::<WriteOp>() {
            if let Some((key, _)) = self.writes.iter().find(|(_, known)| known == op) {
                return Ok(key.clone().into_bytes());
            }
        }
        if let Some(op) = value.downcast_ref::<Upcast>() {
            if let Some((key, _)) = self.upcasts.iter().find(|(_, known)| known == op) {
                return Ok(key.clone().into_bytes());
            }
        }
        Err(Error::missing_op("op not present in the codec registry"))
    }

    fn decode(&self, bytes: &[u8]) -> tagwire::Result<Obj> {
        let key = std::str::from_utf8(bytes)
            .map_err(|_| Error::framing("registry key is not UTF-8"))?;
        if let Some((_, op)) = self.reads.iter().find(|(k, _)| k == key) {
            return Ok(Obj::new(op.clone()));
        }
        if let Some((_, op)) = self.writes.iter().find(|(k, _)| k == key) {
            return Ok(Obj::new(op.clone()));
        }
        if let Some((_, op)) = self.upcasts.iter().find(|(k, _)| k == key) {
            return Ok(Obj::new(op.clone()));
        }
        Err(Error::missing_op(format!("unknown registry key `{key}`")))
    }
}

fn encode_data(schema: &Schema, value: &SerializableData) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut ser = Serializer::new(&mut bytes, schema);
    ser.write(value).expect("data encodes");
    bytes
}

#[test]
fn schema_roundtrips_through_its_own_wire_format() {
    let schema = data_schema();
    let codec = RegistryCodec::for_schema(&schema);

    // Serialize the schema itself.
    let mut schema_bytes = Vec::new();
    {
        let mut ser = Serializer::new(&mut schema_bytes, &schema).with_opaque_codec(&codec);
        ser.write(&schema.clone()).expect("schema encodes");
    }

    // Reload it and compare shape.
    let mut cursor = Cursor::new(schema_bytes);
    let mut de = Deserializer::new(&mut cursor, &schema).with_opaque_codec(&codec);
    let reloaded = Schema::read_from(&mut de).expect("schema decodes");
    assert_eq!(reloaded.len(), schema.len());
    let protocol = reloaded.protocol("SerializableData").expect("protocol survives");
    assert!(protocol.read_op().is_some());
    assert!(protocol.write_op().is_some());
    assert!(!protocol.has_static());
    assert!(!protocol.has_fallback());

    // The reloaded schema serializes covered values byte-identically.
    let value =
        SerializableData { tag: "metrics".to_owned(), payload: vec![1, 1, 2, 3, 5, 8] };
    let original_bytes = encode_data(&schema, &value);
    let reloaded_bytes = encode_data(&reloaded, &value);
    assert_eq!(original_bytes, reloaded_bytes);

    // And reads them back to equality.
    let mut cursor = Cursor::new(reloaded_bytes);
    let mut de = Deserializer::new(&mut cursor, &reloaded);
    let decoded = de.read_object::<SerializableData>().expect("decodes").expect("non-null");
    assert_eq!(decoded, value);
}

#[test]
fn schema_serialization_without_codec_is_a_missing_operation() {
    let schema = data_schema();
    let mut bytes = Vec::new();
    let mut ser = Serializer::new(&mut bytes, &schema);
    let err = ser.write(&schema.clone()).expect_err("no codec installed");
    assert!(matches!(err, Error::MissingOperation(_)));
}
