//! The deserializer: read dispatch, supertype packet frames, and framing
//! enforcement.
//!
//! A [`Deserializer`] borrows a schema and a byte source for the duration of
//! a call. Typed readers consume exactly one tag and its payload; the
//! generic [`Deserializer::read_value`] reproduces, value by value, exactly
//! the bytes a serializer emitted.
//!
//! When an `OBJECT` block is read, its supertype packets are captured as raw
//! byte slices keyed by type name before the resolved reader runs. The
//! reader can then open a mini-deserializer scoped to any packet via
//! [`Deserializer::supertype`], so ancestors without readers of their own
//! still round-trip through their subtype.

use std::any::{Any, TypeId};

use tracing::{debug, trace};

use crate::builtin::{find_reader, NONNULL_READERS, NULLABLE_READERS};
use crate::error::{Error, Result};
use crate::flag::TypeFlag;
use crate::io::{map_read_err, unit_to_char, usable_len, ByteSource, Scalar};
use crate::opaque::OpaqueCodec;
use crate::schema::Schema;
use crate::value::{FromValue, Obj, Value};

enum Input<'a> {
    Stream(&'a mut dyn ByteSource),
    Scoped(std::io::Cursor<Vec<u8>>),
}

/// How a supertype packet is addressed from the subtype's reader.
enum PacketKey {
    /// A custom ancestor packet, keyed by its type name.
    Named(String),
    /// The built-in-as-super record, keyed by the built-in's tag.
    Builtin(TypeFlag),
}

struct Packet {
    key: PacketKey,
    bytes: Vec<u8>,
}

/// The per-`OBJECT` frame: captured supertype packets, in wire order.
struct Frame {
    packets: Vec<Packet>,
}

/// Decodes values from a byte source, governed by a schema.
pub struct Deserializer<'a> {
    input: Input<'a>,
    schema: &'a Schema,
    codec: Option<&'a dyn OpaqueCodec>,
    frames: Vec<Frame>,
}

impl<'a> Deserializer<'a> {
    /// Creates a deserializer over the given source.
    ///
    /// The stream stays owned by the caller.
    pub fn new(source: &'a mut dyn ByteSource, schema: &'a Schema) -> Self {
        Self { input: Input::Stream(source), schema, codec: None, frames: Vec::new() }
    }

    /// Installs the external decoder used for the `FUNCTION` tag.
    #[must_use]
    pub fn with_opaque_codec(mut self, codec: &'a dyn OpaqueCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// The schema governing this deserializer.
    #[must_use]
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub(crate) fn codec(&self) -> Option<&'a dyn OpaqueCodec> {
        self.codec
    }

    /// A mini-deserializer over an owned byte slice, sharing schema and
    /// codec. Used for supertype packets.
    fn scoped(&self, bytes: Vec<u8>) -> Deserializer<'a> {
        Deserializer {
            input: Input::Scoped(std::io::Cursor::new(bytes)),
            schema: self.schema,
            codec: self.codec,
            frames: Vec::new(),
        }
    }

    // -- raw intake ---------------------------------------------------------

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = match &mut self.input {
            Input::Stream(source) => source.read_exact(buf),
            Input::Scoped(cursor) => std::io::Read::read_exact(cursor, buf),
        };
        result.map_err(map_read_err)
    }

    fn take_arr<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    fn take_n(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn take_flag(&mut self) -> Result<TypeFlag> {
        let [byte] = self.take_arr::<1>()?;
        TypeFlag::from_byte(byte)
            .ok_or_else(|| Error::framing(format!("unknown tag byte {byte:#04x}")))
    }

    pub(crate) fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take_arr::<1>()?[0])
    }

    pub(crate) fn expect_flag(&mut self, expected: TypeFlag) -> Result<()> {
        let flag = self.take_flag()?;
        if flag == expected {
            Ok(())
        } else {
            Err(Error::type_mismatch(expected.name(), flag.name()))
        }
    }

    pub(crate) fn take_bool(&mut self) -> Result<bool> {
        Ok(self.take_arr::<1>()?[0] != 0)
    }

    pub(crate) fn take_i8(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.take_arr::<1>()?))
    }

    pub(crate) fn take_char(&mut self) -> Result<char> {
        unit_to_char(u16::from_be_bytes(self.take_arr::<2>()?))
    }

    pub(crate) fn take_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take_arr::<2>()?))
    }

    pub(crate) fn take_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_arr::<4>()?))
    }

    pub(crate) fn take_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take_arr::<8>()?))
    }

    pub(crate) fn take_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.take_arr::<4>()?))
    }

    pub(crate) fn take_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take_arr::<8>()?))
    }

    pub(crate) fn take_str_raw(&mut self) -> Result<String> {
        let len = usable_len(self.take_i32()?, "string")?;
        let bytes = self.take_n(len)?;
        String::from_utf8(bytes).map_err(|e| Error::framing(format!("invalid UTF-8: {e}")))
    }

    pub(crate) fn take_function_payload(&mut self) -> Result<Vec<u8>> {
        let len = usable_len(self.take_i32()?, "opaque payload")?;
        self.take_n(len)
    }

    // -- typed readers: one tag, one payload --------------------------------

    /// Reads a `BOOLEAN` record.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch when the next tag is not `BOOLEAN`.
    pub fn read_bool(&mut self) -> Result<bool> {
        self.expect_flag(TypeFlag::Boolean)?;
        self.take_bool()
    }

    /// Reads a `BYTE` record.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch when the next tag is not `BYTE`.
    pub fn read_byte(&mut self) -> Result<i8> {
        self.expect_flag(TypeFlag::Byte)?;
        self.take_i8()
    }

    /// Reads a `CHAR` record.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch when the next tag is not `CHAR`.
    pub fn read_char(&mut self) -> Result<char> {
        self.expect_flag(TypeFlag::Char)?;
        self.take_char()
    }

    /// Reads a `SHORT` record.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch when the next tag is not `SHORT`.
    pub fn read_short(&mut self) -> Result<i16> {
        self.expect_flag(TypeFlag::Short)?;
        self.take_i16()
    }

    /// Reads an `INT` record.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch when the next tag is not `INT`.
    pub fn read_int(&mut self) -> Result<i32> {
        self.expect_flag(TypeFlag::Int)?;
        self.take_i32()
    }

    /// Reads a `LONG` record.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch when the next tag is not `LONG`.
    pub fn read_long(&mut self) -> Result<i64> {
        self.expect_flag(TypeFlag::Long)?;
        self.take_i64()
    }

    /// Reads a `FLOAT` record.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch when the next tag is not `FLOAT`.
    pub fn read_float(&mut self) -> Result<f32> {
        self.expect_flag(TypeFlag::Float)?;
        self.take_f32()
    }

    /// Reads a `DOUBLE` record.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch when the next tag is not `DOUBLE`.
    pub fn read_double(&mut self) -> Result<f64> {
        self.expect_flag(TypeFlag::Double)?;
        self.take_f64()
    }

    /// Reads a `STRING` record.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch when the next tag is not `STRING`.
    pub fn read_str(&mut self) -> Result<String> {
        self.expect_flag(TypeFlag::Str)?;
        self.take_str_raw()
    }

    /// Reads the `UNIT` singleton.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch when the next tag is not `UNIT`.
    pub fn read_unit(&mut self) -> Result<()> {
        self.expect_flag(TypeFlag::Unit)
    }

    /// Reads a `FUNCTION` record and hands the payload to the opaque
    /// decoder.
    ///
    /// # Errors
    ///
    /// Fails with a missing operation when no codec is installed.
    pub fn read_function(&mut self) -> Result<Obj> {
        self.expect_flag(TypeFlag::Function)?;
        let payload = self.take_function_payload()?;
        let codec = self
            .codec
            .ok_or_else(|| Error::missing_op("FUNCTION payload and no opaque codec installed"))?;
        codec.decode(&payload)
    }

    pub(crate) fn take_scalar_array<T: Scalar>(&mut self) -> Result<Vec<T>> {
        let len = usable_len(self.take_i32()?, "array")?;
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(T::read_from(self)?);
        }
        Ok(items)
    }

    // -- generic dispatch ---------------------------------------------------

    /// Reads any dynamic value: the default, null-permitting path.
    ///
    /// # Errors
    ///
    /// Fails with a missing operation when an `OBJECT` block's name has no
    /// resolvable reader, and with a framing error on grammar violations.
    pub fn read_value(&mut self) -> Result<Value> {
        let flag = self.take_flag()?;
        self.decode_with(flag, false)
    }

    /// Reads any dynamic value through the non-null fast path.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch on a `NULL` tag.
    pub fn read_value_nonnull(&mut self) -> Result<Value> {
        let flag = self.take_flag()?;
        self.decode_with(flag, true)
    }

    /// Reads a value and converts it out of the dynamic universe.
    ///
    /// A `NULL` tag erases to `None` regardless of the requested type.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch when the decoded shape is not a `T`.
    pub fn read_as<T: FromValue>(&mut self) -> Result<Option<T>> {
        match self.read_value()? {
            Value::Null => Ok(None),
            value => T::from_value(value).map(Some),
        }
    }

    /// Reads a user-typed value and downcasts it.
    ///
    /// A `NULL` tag erases to `None` regardless of the requested type.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch when the value is not an object of type
    /// `T`.
    pub fn read_object<T: Any + Send + Sync>(&mut self) -> Result<Option<T>> {
        match self.read_value()? {
            Value::Null => Ok(None),
            Value::Object(obj) => obj.downcast::<T>().map(Some),
            other => {
                Err(Error::type_mismatch(std::any::type_name::<T>(), other.flag().name()))
            }
        }
    }

    pub(crate) fn take_member(&mut self, nonnull: bool) -> Result<Value> {
        if nonnull {
            self.read_value_nonnull()
        } else {
            self.read_value()
        }
    }

    pub(crate) fn take_counted(&mut self, nonnull: bool) -> Result<Vec<Value>> {
        let len = usable_len(self.take_i32()?, "container")?;
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(self.take_member(nonnull)?);
        }
        Ok(items)
    }

    pub(crate) fn take_terminated(&mut self, nonnull: bool) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        loop {
            let flag = self.take_flag()?;
            if flag == TypeFlag::EndObject {
                return Ok(items);
            }
            items.push(self.decode_with(flag, nonnull)?);
        }
    }

    pub(crate) fn take_map(&mut self, nonnull: bool) -> Result<Vec<(Value, Value)>> {
        let len = usable_len(self.take_i32()?, "MAP")?;
        let mut entries = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            let key = self.take_member(nonnull)?;
            let value = self.take_member(nonnull)?;
            entries.push((key, value));
        }
        Ok(entries)
    }

    fn decode_with(&mut self, flag: TypeFlag, nonnull: bool) -> Result<Value> {
        match flag {
            TypeFlag::Null => {
                if nonnull {
                    Err(Error::type_mismatch("non-null value", "NULL"))
                } else {
                    Ok(Value::Null)
                }
            }
            TypeFlag::EndObject => Err(Error::framing("unexpected END_OBJECT in value position")),
            TypeFlag::Object => self.read_object_block().map(Value::Object),
            TypeFlag::Function => self.take_function_payload().map(Value::Function),
            other if nonnull => match find_reader(NONNULL_READERS, other) {
                Some(entry) => (entry.read)(self),
                None => Err(Error::framing(format!("no non-null handler for {other}"))),
            },
            TypeFlag::Boolean => self.take_bool().map(Value::Bool),
            TypeFlag::Byte => self.take_i8().map(Value::Byte),
            TypeFlag::Char => self.take_char().map(Value::Char),
            TypeFlag::Short => self.take_i16().map(Value::Short),
            TypeFlag::Int => self.take_i32().map(Value::Int),
            TypeFlag::Long => self.take_i64().map(Value::Long),
            TypeFlag::Float => self.take_f32().map(Value::Float),
            TypeFlag::Double => self.take_f64().map(Value::Double),
            TypeFlag::Str => self.take_str_raw().map(Value::Str),
            TypeFlag::Unit => Ok(Value::Unit),
            other => match find_reader(NULLABLE_READERS, other) {
                Some(entry) => (entry.read)(self),
                None => Err(Error::framing(format!("no handler for {other}"))),
            },
        }
    }

    // -- OBJECT blocks ------------------------------------------------------

    fn read_object_block(&mut self) -> Result<Obj> {
        let name = self.take_str_raw()?;
        let super_count = self.take_arr::<1>()?[0];
        trace!(target: "tagwire::de", %name, super_count, "reading object block");

        let mut packets = Vec::with_capacity(usize::from(super_count));
        for _ in 0..super_count {
            packets.push(self.capture_packet()?);
        }

        let schema = self.schema;
        let resolved = schema.resolve_reader(&name).ok_or_else(|| {
            Error::missing_op(format!("no read operation resolvable for type named `{name}`"))
        })?;
        if resolved.via_fallback {
            trace!(target: "tagwire::de", %name, fallback = %resolved.owner, "using fallback reader");
        }

        self.frames.push(Frame { packets });
        let result = resolved.op.invoke(self);
        self.frames.pop();
        let obj = result?;

        // Whatever the reader left unread is discarded, up to the
        // terminator. Fallback readers rely on this.
        let mut discarded = 0usize;
        loop {
            let flag = self.take_flag()?;
            if flag == TypeFlag::EndObject {
                break;
            }
            let mut scratch = Vec::new();
            self.capture_with(flag, &mut scratch)?;
            discarded += 1;
        }
        if discarded > 0 {
            debug!(target: "tagwire::de", %name, discarded, "discarded unread payload values");
        }
        Ok(obj)
    }

    // -- supertype packet access --------------------------------------------

    /// Opens a mini-deserializer over the packet written by the ancestor
    /// type `S`.
    ///
    /// # Errors
    ///
    /// Fails with a missing operation when `S` is not registered, and with
    /// a framing error when no frame is active or the packet is absent.
    pub fn supertype<S: Any>(&self) -> Result<Deserializer<'a>> {
        let name = self.schema.name_of(TypeId::of::<S>()).ok_or_else(|| {
            Error::missing_op(format!(
                "supertype query for unregistered type `{}`",
                std::any::type_name::<S>()
            ))
        })?;
        self.supertype_named(name)
    }

    /// Opens a mini-deserializer over the packet of the named ancestor.
    ///
    /// # Errors
    ///
    /// Fails with a framing error when no frame is active or the packet is
    /// absent.
    pub fn supertype_named(&self, name: &str) -> Result<Deserializer<'a>> {
        let frame = self.current_frame()?;
        let packet = frame
            .packets
            .iter()
            .find(|packet| matches!(&packet.key, PacketKey::Named(n) if n == name))
            .ok_or_else(|| Error::framing(format!("no supertype packet named `{name}`")))?;
        Ok(self.scoped(packet.bytes.clone()))
    }

    /// Opens a mini-deserializer over the directly-inherited supertype
    /// packet: the last custom packet in wire order.
    ///
    /// # Errors
    ///
    /// Fails with a framing error when no frame is active or the block has
    /// no custom supertype packets.
    pub fn superclass(&self) -> Result<Deserializer<'a>> {
        let frame = self.current_frame()?;
        let packet = frame
            .packets
            .iter()
            .rev()
            .find(|packet| matches!(packet.key, PacketKey::Named(_)))
            .ok_or_else(|| Error::framing("no supertype packet in the current frame"))?;
        Ok(self.scoped(packet.bytes.clone()))
    }

    /// Decodes the built-in-as-super record of the current frame, if the
    /// writer emitted one.
    ///
    /// # Errors
    ///
    /// Fails with a framing error when no frame is active or no built-in
    /// packet was written.
    pub fn builtin_super(&self) -> Result<Value> {
        let frame = self.current_frame()?;
        let packet = frame
            .packets
            .iter()
            .find(|packet| matches!(packet.key, PacketKey::Builtin(_)))
            .ok_or_else(|| Error::framing("no built-in supertype packet in the current frame"))?;
        if let PacketKey::Builtin(flag) = packet.key {
            trace!(target: "tagwire::de", builtin = %flag, "decoding built-in supertype packet");
        }
        self.scoped(packet.bytes.clone()).read_value_nonnull()
    }

    fn current_frame(&self) -> Result<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| Error::framing("supertype query outside an object frame"))
    }

    // -- packet capture -----------------------------------------------------

    /// Captures one supertype packet without interpreting it. Custom packets
    /// keep only their own payload bytes; built-in records keep the whole
    /// tagged record.
    fn capture_packet(&mut self) -> Result<Packet> {
        let flag = self.take_flag()?;
        match flag {
            TypeFlag::Object => {
                let name = self.take_str_raw()?;
                let nested = self.take_arr::<1>()?[0];
                if nested != 0 {
                    return Err(Error::framing(format!(
                        "supertype packet `{name}` declares {nested} supertypes"
                    )));
                }
                let mut bytes = Vec::new();
                loop {
                    let inner = self.take_flag()?;
                    if inner == TypeFlag::EndObject {
                        break;
                    }
                    bytes.push(inner.as_byte());
                    self.capture_with(inner, &mut bytes)?;
                }
                Ok(Packet { key: PacketKey::Named(name), bytes })
            }
            TypeFlag::EndObject => {
                Err(Error::framing("END_OBJECT where a supertype packet was declared"))
            }
            builtin => {
                let mut bytes = vec![builtin.as_byte()];
                self.capture_with(builtin, &mut bytes)?;
                Ok(Packet { key: PacketKey::Builtin(builtin), bytes })
            }
        }
    }

    fn copy_n(&mut self, n: usize, out: &mut Vec<u8>) -> Result<()> {
        let bytes = self.take_n(n)?;
        out.extend_from_slice(&bytes);
        Ok(())
    }

    fn copy_count(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let count = self.take_i32()?;
        out.extend_from_slice(&count.to_be_bytes());
        usable_len(count, "captured value")
    }

    /// Copies the payload of a value whose tag was already consumed. The
    /// format is self-describing, so this is a structural walk that never
    /// runs protocol code.
    fn capture_with(&mut self, flag: TypeFlag, out: &mut Vec<u8>) -> Result<()> {
        match flag {
            TypeFlag::Null | TypeFlag::Unit => Ok(()),
            TypeFlag::EndObject => Err(Error::framing("unexpected END_OBJECT in value position")),
            TypeFlag::Boolean | TypeFlag::Byte => self.copy_n(1, out),
            TypeFlag::Char | TypeFlag::Short => self.copy_n(2, out),
            TypeFlag::Int | TypeFlag::Float => self.copy_n(4, out),
            TypeFlag::Long | TypeFlag::Double => self.copy_n(8, out),
            TypeFlag::BooleanArray | TypeFlag::ByteArray => {
                let len = self.copy_count(out)?;
                self.copy_n(len, out)
            }
            TypeFlag::CharArray | TypeFlag::ShortArray => {
                let len = self.copy_count(out)?;
                self.copy_n(len * 2, out)
            }
            TypeFlag::IntArray | TypeFlag::FloatArray => {
                let len = self.copy_count(out)?;
                self.copy_n(len * 4, out)
            }
            TypeFlag::LongArray | TypeFlag::DoubleArray => {
                let len = self.copy_count(out)?;
                self.copy_n(len * 8, out)
            }
            TypeFlag::Str | TypeFlag::Function => {
                let len = self.copy_count(out)?;
                self.copy_n(len, out)
            }
            TypeFlag::ObjectArray | TypeFlag::List => {
                let len = self.copy_count(out)?;
                for _ in 0..len {
                    self.capture_value(out)?;
                }
                Ok(())
            }
            TypeFlag::Map => {
                let len = self.copy_count(out)?;
                for _ in 0..len {
                    self.capture_value(out)?;
                    self.capture_value(out)?;
                }
                Ok(())
            }
            TypeFlag::Iterable => {
                loop {
                    let inner = self.take_flag()?;
                    out.push(inner.as_byte());
                    if inner == TypeFlag::EndObject {
                        return Ok(());
                    }
                    self.capture_with(inner, out)?;
                }
            }
            TypeFlag::Pair | TypeFlag::MapEntry => {
                self.capture_value(out)?;
                self.capture_value(out)
            }
            TypeFlag::Triple => {
                self.capture_value(out)?;
                self.capture_value(out)?;
                self.capture_value(out)
            }
            TypeFlag::Object => {
                let name = self.take_str_raw()?;
                out.extend_from_slice(&crate::io::wire_len(name.len(), "string")?.to_be_bytes());
                out.extend_from_slice(name.as_bytes());
                let super_count = self.take_arr::<1>()?[0];
                out.push(super_count);
                for _ in 0..super_count {
                    self.capture_value(out)?;
                }
                loop {
                    let inner = self.take_flag()?;
                    out.push(inner.as_byte());
                    if inner == TypeFlag::EndObject {
                        return Ok(());
                    }
                    self.capture_with(inner, out)?;
                }
            }
        }
    }

    /// Captures one complete tagged value, tag included.
    fn capture_value(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let flag = self.take_flag()?;
        out.push(flag.as_byte());
        self.capture_with(flag, out)
    }
}
