//! The serializer: write dispatch and `OBJECT` block composition.
//!
//! A [`Serializer`] borrows a schema and a byte sink for the duration of a
//! call. Every typed emitter writes exactly one tag and its payload; the
//! generic entry points classify a value and route it to a protocol, a
//! built-in handler, or the opaque escape hatch.
//!
//! Bytes emitted by a single serializer are totally ordered. The instance
//! holds a position in the stream and must not be shared across threads.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::LazyLock;

use tracing::trace;

use crate::builtin::{find_writer, NONNULL_WRITERS, NULLABLE_WRITERS};
use crate::error::{Error, Result};
use crate::flag::TypeFlag;
use crate::io::{char_to_unit, wire_len, ByteSink, Scalar};
use crate::opaque::OpaqueCodec;
use crate::schema::Schema;
use crate::value::Value;

/// Encodes values onto a byte sink, governed by a schema.
pub struct Serializer<'a> {
    sink: &'a mut dyn ByteSink,
    schema: &'a Schema,
    codec: Option<&'a dyn OpaqueCodec>,
}

impl<'a> Serializer<'a> {
    /// Creates a serializer over the given sink.
    ///
    /// The stream stays owned by the caller; the engine closes it on an
    /// explicit [`Serializer::close`] only.
    pub fn new(sink: &'a mut dyn ByteSink, schema: &'a Schema) -> Self {
        Self { sink, schema, codec: None }
    }

    /// Installs the external encoder used for the `FUNCTION` tag.
    #[must_use]
    pub fn with_opaque_codec(mut self, codec: &'a dyn OpaqueCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// The schema governing this serializer.
    #[must_use]
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub(crate) fn codec(&self) -> Option<&'a dyn OpaqueCodec> {
        self.codec
    }

    /// Flushes buffered bytes through to the underlying stream.
    ///
    /// # Errors
    ///
    /// Surfaces stream errors unwrapped.
    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush().map_err(Error::Io)
    }

    /// Flushes and releases the underlying stream.
    ///
    /// # Errors
    ///
    /// Surfaces stream errors unwrapped.
    pub fn close(&mut self) -> Result<()> {
        self.sink.close().map_err(Error::Io)
    }

    // -- raw emitters -------------------------------------------------------

    pub(crate) fn emit_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.write_all(bytes).map_err(Error::Io)
    }

    pub(crate) fn emit_flag(&mut self, flag: TypeFlag) -> Result<()> {
        self.emit_bytes(&[flag.as_byte()])
    }

    /// Length-prefixed UTF-8, no tag. Used for `OBJECT` names and string
    /// payloads.
    pub(crate) fn emit_str_payload(&mut self, s: &str) -> Result<()> {
        let len = wire_len(s.len(), "string")?;
        self.emit_bytes(&len.to_be_bytes())?;
        self.emit_bytes(s.as_bytes())
    }

    // -- typed emitters: one tag, one payload -------------------------------

    /// Writes a `BOOLEAN` record.
    ///
    /// # Errors
    ///
    /// Surfaces stream errors unwrapped.
    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.emit_flag(TypeFlag::Boolean)?;
        self.emit_bytes(&[u8::from(v)])
    }

    /// Writes a `BYTE` record.
    ///
    /// # Errors
    ///
    /// Surfaces stream errors unwrapped.
    pub fn write_byte(&mut self, v: i8) -> Result<()> {
        self.emit_flag(TypeFlag::Byte)?;
        self.emit_bytes(&v.to_be_bytes())
    }

    /// Writes a `CHAR` record as one UTF-16 code unit.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch for scalars outside the Basic
    /// Multilingual Plane.
    pub fn write_char(&mut self, v: char) -> Result<()> {
        let unit = char_to_unit(v)?;
        self.emit_flag(TypeFlag::Char)?;
        self.emit_bytes(&unit.to_be_bytes())
    }

    /// Writes a `SHORT` record.
    ///
    /// # Errors
    ///
    /// Surfaces stream errors unwrapped.
    pub fn write_short(&mut self, v: i16) -> Result<()> {
        self.emit_flag(TypeFlag::Short)?;
        self.emit_bytes(&v.to_be_bytes())
    }

    /// Writes an `INT` record.
    ///
    /// # Errors
    ///
    /// Surfaces stream errors unwrapped.
    pub fn write_int(&mut self, v: i32) -> Result<()> {
        self.emit_flag(TypeFlag::Int)?;
        self.emit_bytes(&v.to_be_bytes())
    }

    /// Writes a `LONG` record.
    ///
    /// # Errors
    ///
    /// Surfaces stream errors unwrapped.
    pub fn write_long(&mut self, v: i64) -> Result<()> {
        self.emit_flag(TypeFlag::Long)?;
        self.emit_bytes(&v.to_be_bytes())
    }

    /// Writes a `FLOAT` record.
    ///
    /// # Errors
    ///
    /// Surfaces stream errors unwrapped.
    pub fn write_float(&mut self, v: f32) -> Result<()> {
        self.emit_flag(TypeFlag::Float)?;
        self.emit_bytes(&v.to_be_bytes())
    }

    /// Writes a `DOUBLE` record.
    ///
    /// # Errors
    ///
    /// Surfaces stream errors unwrapped.
    pub fn write_double(&mut self, v: f64) -> Result<()> {
        self.emit_flag(TypeFlag::Double)?;
        self.emit_bytes(&v.to_be_bytes())
    }

    /// Writes a `STRING` record.
    ///
    /// # Errors
    ///
    /// Surfaces stream errors unwrapped.
    pub fn write_str(&mut self, v: &str) -> Result<()> {
        self.emit_flag(TypeFlag::Str)?;
        self.emit_str_payload(v)
    }

    /// Writes the `UNIT` singleton.
    ///
    /// # Errors
    ///
    /// Surfaces stream errors unwrapped.
    pub fn write_unit(&mut self) -> Result<()> {
        self.emit_flag(TypeFlag::Unit)
    }

    /// Writes the `NULL` tag; exactly one byte.
    ///
    /// # Errors
    ///
    /// Surfaces stream errors unwrapped.
    pub fn write_null(&mut self) -> Result<()> {
        self.emit_flag(TypeFlag::Null)
    }

    /// Writes a `FUNCTION` record around an already-encoded opaque payload.
    ///
    /// # Errors
    ///
    /// Surfaces stream errors unwrapped.
    pub fn write_opaque(&mut self, payload: &[u8]) -> Result<()> {
        self.emit_flag(TypeFlag::Function)?;
        let len = wire_len(payload.len(), "opaque payload")?;
        self.emit_bytes(&len.to_be_bytes())?;
        self.emit_bytes(payload)
    }

    // -- container emitters -------------------------------------------------

    pub(crate) fn emit_scalar_array<T: Scalar>(&mut self, flag: TypeFlag, items: &[T]) -> Result<()> {
        self.emit_flag(flag)?;
        let len = wire_len(items.len(), flag.name())?;
        self.emit_bytes(&len.to_be_bytes())?;
        for item in items {
            item.write_to(self)?;
        }
        Ok(())
    }

    pub(crate) fn emit_counted(&mut self, flag: TypeFlag, items: &[Value], nonnull: bool) -> Result<()> {
        self.emit_flag(flag)?;
        let len = wire_len(items.len(), flag.name())?;
        self.emit_bytes(&len.to_be_bytes())?;
        for item in items {
            self.emit_member(item, nonnull)?;
        }
        Ok(())
    }

    pub(crate) fn emit_terminated(&mut self, items: &[Value], nonnull: bool) -> Result<()> {
        self.emit_flag(TypeFlag::Iterable)?;
        for item in items {
            self.emit_member(item, nonnull)?;
        }
        self.emit_flag(TypeFlag::EndObject)
    }

    pub(crate) fn emit_fixed(&mut self, flag: TypeFlag, members: &[&Value], nonnull: bool) -> Result<()> {
        self.emit_flag(flag)?;
        for member in members {
            self.emit_member(member, nonnull)?;
        }
        Ok(())
    }

    pub(crate) fn emit_map(&mut self, entries: &[(Value, Value)], nonnull: bool) -> Result<()> {
        self.emit_flag(TypeFlag::Map)?;
        let len = wire_len(entries.len(), "MAP")?;
        self.emit_bytes(&len.to_be_bytes())?;
        for (key, value) in entries {
            self.emit_member(key, nonnull)?;
            self.emit_member(value, nonnull)?;
        }
        Ok(())
    }

    fn emit_member(&mut self, member: &Value, nonnull: bool) -> Result<()> {
        if nonnull {
            self.write_value_nonnull(member)
        } else {
            self.write_value(member)
        }
    }

    // -- generic dispatch ---------------------------------------------------

    /// Writes any dynamic value: the default, null-permitting path.
    ///
    /// # Errors
    ///
    /// Fails with a missing operation when an object value's runtime type
    /// has no resolvable writer.
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.write_null(),
            Value::Bool(v) => self.write_bool(*v),
            Value::Byte(v) => self.write_byte(*v),
            Value::Char(v) => self.write_char(*v),
            Value::Short(v) => self.write_short(*v),
            Value::Int(v) => self.write_int(*v),
            Value::Long(v) => self.write_long(*v),
            Value::Float(v) => self.write_float(*v),
            Value::Double(v) => self.write_double(*v),
            Value::Str(v) => self.write_str(v),
            Value::Unit => self.write_unit(),
            Value::Function(payload) => self.write_opaque(payload),
            Value::Object(obj) => {
                let schema = self.schema;
                match schema.name_of(obj.type_id()) {
                    Some(name) => self.write_object_dyn(name, obj.as_any()),
                    None => Err(Error::missing_op(format!(
                        "no protocol registered for runtime type `{}`",
                        obj.rust_name()
                    ))),
                }
            }
            container => match find_writer(NULLABLE_WRITERS, container) {
                Some(entry) => (entry.write)(self, container),
                None => Err(Error::missing_op(format!(
                    "no built-in handler for {}",
                    container.flag()
                ))),
            },
        }
    }

    /// Writes any dynamic value through the opt-in fast path: the non-null
    /// table, which trusts the caller that members are non-null.
    ///
    /// # Errors
    ///
    /// Fails with a type mismatch on a null value or member.
    pub fn write_value_nonnull(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => Err(Error::type_mismatch("non-null value", "NULL")),
            Value::Function(payload) => self.write_opaque(payload),
            Value::Object(obj) => {
                let schema = self.schema;
                match schema.name_of(obj.type_id()) {
                    Some(name) => self.write_object_dyn(name, obj.as_any()),
                    None => Err(Error::missing_op(format!(
                        "no protocol registered for runtime type `{}`",
                        obj.rust_name()
                    ))),
                }
            }
            other => match find_writer(NONNULL_WRITERS, other) {
                Some(entry) => (entry.write)(self, other),
                None => Err(Error::missing_op(format!(
                    "no built-in handler for {}",
                    other.flag()
                ))),
            },
        }
    }

    /// Writes a statically typed value.
    ///
    /// Resolution order: a schema protocol for `T`, then the built-in
    /// shapes, then the opaque escape hatch for unnameable types. Anything
    /// else is a missing operation.
    ///
    /// # Errors
    ///
    /// Fails with a missing operation when no writer is resolvable.
    pub fn write<T: Any>(&mut self, value: &T) -> Result<()> {
        let schema = self.schema;
        if let Some(name) = schema.name_of(TypeId::of::<T>()) {
            return self.write_object_dyn(name, value);
        }
        if let Some(write) = mono_writers().get(&TypeId::of::<T>()) {
            return write(self, value);
        }
        let rust_name = std::any::type_name::<T>();
        if rust_name.contains("{{closure}}") {
            let codec = self.codec.ok_or_else(|| {
                Error::missing_op("unnameable value and no opaque codec installed")
            })?;
            let payload = codec.encode(value)?;
            return self.write_opaque(&payload);
        }
        Err(Error::missing_op(format!("no protocol or built-in for type `{rust_name}`")))
    }

    /// Composes the `OBJECT` block for a registered type: header, supertype
    /// packets root-most first, optional built-in-as-super record, own
    /// payload, terminator.
    pub(crate) fn write_object_dyn(&mut self, name: &str, value: &dyn Any) -> Result<()> {
        let schema = self.schema;
        let plan = schema.write_plan(name).ok_or_else(|| {
            Error::missing_op(format!("no write operation resolvable for type named `{name}`"))
        })?;
        trace!(target: "tagwire::ser", %name, super_count = plan.super_count, "writing object block");

        self.emit_flag(TypeFlag::Object)?;
        self.emit_str_payload(name)?;
        self.emit_bytes(&[plan.super_count])?;

        if plan.static_form {
            // A static writer emits exactly its own bytes: no packets.
            if let Some(step) = plan.seq.first() {
                Self::invoke_step(self, step, value)?;
            }
            return self.emit_flag(TypeFlag::EndObject);
        }

        for step in plan.seq.iter().skip(1).rev() {
            self.emit_flag(TypeFlag::Object)?;
            self.emit_str_payload(&step.name)?;
            self.emit_bytes(&[0])?;
            Self::invoke_step(self, step, value)?;
            self.emit_flag(TypeFlag::EndObject)?;
        }

        if let Some(base) = &plan.builtin {
            let view = base.apply(value)?;
            self.write_value_nonnull(&view)?;
        }

        if let Some(step) = plan.seq.first() {
            Self::invoke_step(self, step, value)?;
        }
        self.emit_flag(TypeFlag::EndObject)
    }

    /// Runs one writer of a write sequence against the value, viewed
    /// through the step's upcast chain.
    fn invoke_step(
        ser: &mut Serializer<'_>,
        step: &crate::schema::PlanStep,
        value: &dyn Any,
    ) -> Result<()> {
        let mut view = value;
        for upcast in &step.path {
            view = upcast.apply(view)?;
        }
        step.op.invoke(ser, view)
    }
}

type MonoWrite = fn(&mut Serializer<'_>, &dyn Any) -> Result<()>;

fn downcast_or_bug<'v, T: Any>(value: &'v dyn Any) -> Result<&'v T> {
    value
        .downcast_ref::<T>()
        .ok_or_else(|| Error::type_mismatch(std::any::type_name::<T>(), "a different runtime type"))
}

macro_rules! mono_scalar {
    ($fn_name:ident, $ty:ty, $write:ident) => {
        fn $fn_name(ser: &mut Serializer<'_>, value: &dyn Any) -> Result<()> {
            ser.$write(*downcast_or_bug::<$ty>(value)?)
        }
    };
}

mono_scalar!(mono_bool, bool, write_bool);
mono_scalar!(mono_byte, i8, write_byte);
mono_scalar!(mono_char, char, write_char);
mono_scalar!(mono_short, i16, write_short);
mono_scalar!(mono_int, i32, write_int);
mono_scalar!(mono_long, i64, write_long);
mono_scalar!(mono_float, f32, write_float);
mono_scalar!(mono_double, f64, write_double);

macro_rules! mono_array {
    ($fn_name:ident, $ty:ty, $flag:ident) => {
        fn $fn_name(ser: &mut Serializer<'_>, value: &dyn Any) -> Result<()> {
            ser.emit_scalar_array(TypeFlag::$flag, downcast_or_bug::<Vec<$ty>>(value)?)
        }
    };
}

mono_array!(mono_bool_array, bool, BooleanArray);
mono_array!(mono_byte_array, i8, ByteArray);
mono_array!(mono_char_array, char, CharArray);
mono_array!(mono_short_array, i16, ShortArray);
mono_array!(mono_int_array, i32, IntArray);
mono_array!(mono_long_array, i64, LongArray);
mono_array!(mono_float_array, f32, FloatArray);
mono_array!(mono_double_array, f64, DoubleArray);

fn mono_unit(ser: &mut Serializer<'_>, value: &dyn Any) -> Result<()> {
    downcast_or_bug::<()>(value)?;
    ser.write_unit()
}

fn mono_string(ser: &mut Serializer<'_>, value: &dyn Any) -> Result<()> {
    ser.write_str(downcast_or_bug::<String>(value)?)
}

fn mono_value(ser: &mut Serializer<'_>, value: &dyn Any) -> Result<()> {
    ser.write_value(downcast_or_bug::<Value>(value)?)
}

fn mono_value_list(ser: &mut Serializer<'_>, value: &dyn Any) -> Result<()> {
    ser.emit_counted(TypeFlag::List, downcast_or_bug::<Vec<Value>>(value)?, false)
}

fn mono_value_map(ser: &mut Serializer<'_>, value: &dyn Any) -> Result<()> {
    ser.emit_map(downcast_or_bug::<Vec<(Value, Value)>>(value)?, false)
}

fn mono_schema(ser: &mut Serializer<'_>, value: &dyn Any) -> Result<()> {
    downcast_or_bug::<Schema>(value)?.write_to(ser)
}

fn mono_writers() -> &'static HashMap<TypeId, MonoWrite> {
    static TABLE: LazyLock<HashMap<TypeId, MonoWrite>> = LazyLock::new(|| {
        let mut table: HashMap<TypeId, MonoWrite> = HashMap::new();
        table.insert(TypeId::of::<bool>(), mono_bool);
        table.insert(TypeId::of::<i8>(), mono_byte);
        table.insert(TypeId::of::<char>(), mono_char);
        table.insert(TypeId::of::<i16>(), mono_short);
        table.insert(TypeId::of::<i32>(), mono_int);
        table.insert(TypeId::of::<i64>(), mono_long);
        table.insert(TypeId::of::<f32>(), mono_float);
        table.insert(TypeId::of::<f64>(), mono_double);
        table.insert(TypeId::of::<Vec<bool>>(), mono_bool_array);
        table.insert(TypeId::of::<Vec<i8>>(), mono_byte_array);
        table.insert(TypeId::of::<Vec<char>>(), mono_char_array);
        table.insert(TypeId::of::<Vec<i16>>(), mono_short_array);
        table.insert(TypeId::of::<Vec<i32>>(), mono_int_array);
        table.insert(TypeId::of::<Vec<i64>>(), mono_long_array);
        table.insert(TypeId::of::<Vec<f32>>(), mono_float_array);
        table.insert(TypeId::of::<Vec<f64>>(), mono_double_array);
        table.insert(TypeId::of::<()>(), mono_unit);
        table.insert(TypeId::of::<String>(), mono_string);
        table.insert(TypeId::of::<Value>(), mono_value);
        table.insert(TypeId::of::<Vec<Value>>(), mono_value_list);
        table.insert(TypeId::of::<Vec<(Value, Value)>>(), mono_value_map);
        table.insert(TypeId::of::<Schema>(), mono_schema);
        table
    });
    &TABLE
}

/// The `TypeId`s claimed by built-in handlers; protocols may not shadow
/// them.
pub(crate) fn is_builtin_type_id(id: TypeId) -> bool {
    mono_writers().contains_key(&id)
}
