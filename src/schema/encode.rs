//! Schema self-serialization.
//!
//! A schema is itself a serializable value: each protocol's name, kind,
//! flags and hierarchy links travel as ordinary tagged records, and the
//! read/write ops travel as opaque `FUNCTION` payloads produced by the
//! installed [`OpaqueCodec`](crate::OpaqueCodec). Reloading rebuilds a
//! schema whose ops are the decoded handles, so a reloaded schema encodes
//! covered values byte-for-byte like the schema it was written from.

use crate::de::Deserializer;
use crate::error::{Error, Result};
use crate::flag::TypeFlag;
use crate::ser::Serializer;

use super::protocol::{BuiltinBase, Protocol, ReadOp, TypeKind, Upcast, WriteOp};
use super::Schema;

/// The wire name of the schema's own `OBJECT` block. Reserved; protocols
/// cannot register it.
pub(crate) const SCHEMA_WIRE_NAME: &str = "tagwire.Schema";

const FLAG_FALLBACK: i8 = 1;
const FLAG_STATIC: i8 = 1 << 1;
const FLAG_PARENT: i8 = 1 << 2;
const FLAG_READ: i8 = 1 << 3;
const FLAG_WRITE: i8 = 1 << 4;
const FLAG_BUILTIN_BASE: i8 = 1 << 5;

const fn kind_byte(kind: TypeKind) -> i8 {
    match kind {
        TypeKind::Final => 0,
        TypeKind::Open => 1,
        TypeKind::Abstract => 2,
    }
}

fn kind_from_byte(byte: i8) -> Result<TypeKind> {
    match byte {
        0 => Ok(TypeKind::Final),
        1 => Ok(TypeKind::Open),
        2 => Ok(TypeKind::Abstract),
        other => Err(Error::framing(format!("unknown type kind {other} in schema record"))),
    }
}

impl Schema {
    /// Writes this schema onto the serializer as a single `OBJECT` block.
    ///
    /// # Errors
    ///
    /// Fails with a missing operation when the serializer has no opaque
    /// codec to carry the ops.
    pub fn write_to(&self, ser: &mut Serializer<'_>) -> Result<()> {
        let codec = ser.codec().ok_or_else(|| {
            Error::missing_op("schema serialization needs an opaque codec for its ops")
        })?;

        ser.emit_flag(TypeFlag::Object)?;
        ser.emit_str_payload(SCHEMA_WIRE_NAME)?;
        ser.emit_bytes(&[0])?;

        let count = i32::try_from(self.len())
            .map_err(|_| Error::framing("schema has more protocols than the wire can count"))?;
        ser.write_int(count)?;
        for protocol in self.protocols() {
            ser.write_str(&protocol.name)?;
            ser.write_byte(kind_byte(protocol.kind))?;

            let mut flags = 0i8;
            if protocol.has_fallback {
                flags |= FLAG_FALLBACK;
            }
            if protocol.has_static {
                flags |= FLAG_STATIC;
            }
            if protocol.parent.is_some() {
                flags |= FLAG_PARENT;
            }
            if protocol.read.is_some() {
                flags |= FLAG_READ;
            }
            if protocol.write.is_some() {
                flags |= FLAG_WRITE;
            }
            if protocol.builtin_base.is_some() {
                flags |= FLAG_BUILTIN_BASE;
            }
            ser.write_byte(flags)?;

            if let Some(parent) = &protocol.parent {
                ser.write_str(parent)?;
            }
            if let Some(upcast) = &protocol.upcast {
                ser.write_opaque(&codec.encode(upcast)?)?;
            }
            if let Some(read) = &protocol.read {
                ser.write_opaque(&codec.encode(read)?)?;
            }
            if let Some(write) = &protocol.write {
                ser.write_opaque(&codec.encode(write)?)?;
            }
            if let Some(base) = &protocol.builtin_base {
                ser.write_opaque(&codec.encode(base)?)?;
            }
        }
        ser.emit_flag(TypeFlag::EndObject)
    }

    /// Reads a schema previously written by [`Schema::write_to`].
    ///
    /// # Errors
    ///
    /// Fails with a missing operation when the deserializer has no opaque
    /// codec, and with a framing error on a malformed record.
    pub fn read_from(de: &mut Deserializer<'_>) -> Result<Self> {
        de.expect_flag(TypeFlag::Object)?;
        let name = de.take_str_raw()?;
        if name != SCHEMA_WIRE_NAME {
            return Err(Error::type_mismatch(SCHEMA_WIRE_NAME, name));
        }
        let super_count = de.take_u8()?;
        if super_count != 0 {
            return Err(Error::framing("schema record declares supertype packets"));
        }

        let count = de.read_int()?;
        let count = usize::try_from(count)
            .map_err(|_| Error::framing(format!("negative protocol count {count}")))?;

        let mut protocols = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let name = de.read_str()?;
            let kind = kind_from_byte(de.read_byte()?)?;
            let flags = de.read_byte()?;

            let parent =
                if flags & FLAG_PARENT != 0 { Some(de.read_str()?) } else { None };
            let upcast = if flags & FLAG_PARENT != 0 {
                Some(decode_op::<Upcast>(de, &name, "upcast")?)
            } else {
                None
            };
            let read = if flags & FLAG_READ != 0 {
                Some(decode_op::<ReadOp>(de, &name, "read")?)
            } else {
                None
            };
            let write = if flags & FLAG_WRITE != 0 {
                Some(decode_op::<WriteOp>(de, &name, "write")?)
            } else {
                None
            };
            let builtin_base = if flags & FLAG_BUILTIN_BASE != 0 {
                Some(decode_op::<BuiltinBase>(de, &name, "built-in base")?)
            } else {
                None
            };

            protocols.push(Protocol {
                name,
                type_id: None,
                kind,
                parent,
                upcast,
                builtin_base,
                read,
                write,
                has_fallback: flags & FLAG_FALLBACK != 0,
                has_static: flags & FLAG_STATIC != 0,
            });
        }
        let terminator = de.take_flag()?;
        if terminator != TypeFlag::EndObject {
            return Err(Error::framing(format!(
                "schema record not terminated, found {terminator}"
            )));
        }
        Self::finalize(protocols)
    }
}

/// Decodes one op handle out of a `FUNCTION` record via the opaque codec.
fn decode_op<T: Clone + 'static>(
    de: &mut Deserializer<'_>,
    name: &str,
    slot: &str,
) -> Result<T> {
    let codec = de.codec().ok_or_else(|| {
        Error::missing_op("schema deserialization needs an opaque codec for its ops")
    })?;
    de.expect_flag(TypeFlag::Function)?;
    let payload = de.take_function_payload()?;
    let obj = codec.decode(&payload)?;
    obj.downcast_ref::<T>().cloned().ok_or_else(|| {
        Error::type_mismatch(format!("{slot} op for `{name}`"), obj.rust_name())
    })
}
