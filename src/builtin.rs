//! The built-in handler tables.
//!
//! Two ordered tables map built-in shapes to their wire handlers. Lookup
//! walks each table in insertion order and the first matching entry wins,
//! which is what makes the `List`-before-`Iterable` resolution stable.
//!
//! - The *nullable* table is the default: container members go through the
//!   generic value writer, which emits a tag per member and maps nulls to
//!   the `NULL` tag.
//! - The *non-null* table is the opt-in fast path, and the one used for
//!   built-in-as-super packets. It additionally carries the primitive
//!   wrapper shapes, and its member writers trust the caller: a null member
//!   is a type mismatch instead of a silent `NULL` record.

use crate::de::Deserializer;
use crate::error::{Error, Result};
use crate::flag::TypeFlag;
use crate::ser::Serializer;
use crate::value::Value;

/// One write-side table entry: a shape probe plus the handler that emits the
/// complete tagged record.
pub(crate) struct BuiltinWriter {
    pub(crate) flag: TypeFlag,
    pub(crate) matches: fn(&Value) -> bool,
    pub(crate) write: fn(&mut Serializer<'_>, &Value) -> Result<()>,
}

/// One read-side table entry; the tag has already been consumed when the
/// handler runs.
pub(crate) struct BuiltinReader {
    pub(crate) flag: TypeFlag,
    pub(crate) read: fn(&mut Deserializer<'_>) -> Result<Value>,
}

pub(crate) fn find_writer(table: &'static [BuiltinWriter], value: &Value) -> Option<&'static BuiltinWriter> {
    table.iter().find(|entry| (entry.matches)(value))
}

pub(crate) fn find_reader(table: &'static [BuiltinReader], flag: TypeFlag) -> Option<&'static BuiltinReader> {
    table.iter().find(|entry| entry.flag == flag)
}

fn unexpected(expected: TypeFlag, value: &Value) -> Error {
    Error::type_mismatch(expected.name(), value.flag().name())
}

// ---------------------------------------------------------------------------
// Write handlers
// ---------------------------------------------------------------------------

macro_rules! scalar_array_writer {
    ($fn_name:ident, $variant:ident, $flag:ident) => {
        fn $fn_name(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
            match value {
                Value::$variant(items) => ser.emit_scalar_array(TypeFlag::$flag, items),
                other => Err(unexpected(TypeFlag::$flag, other)),
            }
        }
    };
}

scalar_array_writer!(w_bool_array, BoolArray, BooleanArray);
scalar_array_writer!(w_byte_array, ByteArray, ByteArray);
scalar_array_writer!(w_char_array, CharArray, CharArray);
scalar_array_writer!(w_short_array, ShortArray, ShortArray);
scalar_array_writer!(w_int_array, IntArray, IntArray);
scalar_array_writer!(w_long_array, LongArray, LongArray);
scalar_array_writer!(w_float_array, FloatArray, FloatArray);
scalar_array_writer!(w_double_array, DoubleArray, DoubleArray);

fn w_object_array(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Array(items) => ser.emit_counted(TypeFlag::ObjectArray, items, false),
        other => Err(unexpected(TypeFlag::ObjectArray, other)),
    }
}

fn w_list(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::List(items) => ser.emit_counted(TypeFlag::List, items, false),
        other => Err(unexpected(TypeFlag::List, other)),
    }
}

fn w_seq(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Seq(items) => ser.emit_terminated(items, false),
        other => Err(unexpected(TypeFlag::Iterable, other)),
    }
}

fn w_pair(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Pair(a, b) => ser.emit_fixed(TypeFlag::Pair, &[a, b].map(Box::as_ref), false),
        other => Err(unexpected(TypeFlag::Pair, other)),
    }
}

fn w_triple(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Triple(a, b, c) => ser.emit_fixed(TypeFlag::Triple, &[a, b, c].map(Box::as_ref), false),
        other => Err(unexpected(TypeFlag::Triple, other)),
    }
}

fn w_entry(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Entry(k, v) => ser.emit_fixed(TypeFlag::MapEntry, &[k, v].map(Box::as_ref), false),
        other => Err(unexpected(TypeFlag::MapEntry, other)),
    }
}

fn w_map(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Map(entries) => ser.emit_map(entries, false),
        other => Err(unexpected(TypeFlag::Map, other)),
    }
}

fn w_object_array_nn(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Array(items) => ser.emit_counted(TypeFlag::ObjectArray, items, true),
        other => Err(unexpected(TypeFlag::ObjectArray, other)),
    }
}

fn w_list_nn(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::List(items) => ser.emit_counted(TypeFlag::List, items, true),
        other => Err(unexpected(TypeFlag::List, other)),
    }
}

fn w_seq_nn(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Seq(items) => ser.emit_terminated(items, true),
        other => Err(unexpected(TypeFlag::Iterable, other)),
    }
}

fn w_pair_nn(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Pair(a, b) => ser.emit_fixed(TypeFlag::Pair, &[a, b].map(Box::as_ref), true),
        other => Err(unexpected(TypeFlag::Pair, other)),
    }
}

fn w_triple_nn(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Triple(a, b, c) => ser.emit_fixed(TypeFlag::Triple, &[a, b, c].map(Box::as_ref), true),
        other => Err(unexpected(TypeFlag::Triple, other)),
    }
}

fn w_entry_nn(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Entry(k, v) => ser.emit_fixed(TypeFlag::MapEntry, &[k, v].map(Box::as_ref), true),
        other => Err(unexpected(TypeFlag::MapEntry, other)),
    }
}

fn w_map_nn(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Map(entries) => ser.emit_map(entries, true),
        other => Err(unexpected(TypeFlag::Map, other)),
    }
}

macro_rules! scalar_writer {
    ($fn_name:ident, $variant:ident, $flag:ident, $emit:ident) => {
        fn $fn_name(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
            match value {
                Value::$variant(v) => ser.$emit(*v),
                other => Err(unexpected(TypeFlag::$flag, other)),
            }
        }
    };
}

scalar_writer!(w_bool, Bool, Boolean, write_bool);
scalar_writer!(w_byte, Byte, Byte, write_byte);
scalar_writer!(w_char, Char, Char, write_char);
scalar_writer!(w_short, Short, Short, write_short);
scalar_writer!(w_int, Int, Int, write_int);
scalar_writer!(w_long, Long, Long, write_long);
scalar_writer!(w_float, Float, Float, write_float);
scalar_writer!(w_double, Double, Double, write_double);

fn w_str(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Str(s) => ser.write_str(s),
        other => Err(unexpected(TypeFlag::Str, other)),
    }
}

fn w_unit(ser: &mut Serializer<'_>, value: &Value) -> Result<()> {
    match value {
        Value::Unit => ser.write_unit(),
        other => Err(unexpected(TypeFlag::Unit, other)),
    }
}

macro_rules! probe {
    ($variant:ident) => {
        |value: &Value| matches!(value, Value::$variant { .. })
    };
}

/// The default table: container shapes whose members run through the
/// generic, null-permitting writer. Insertion order is resolution order.
pub(crate) static NULLABLE_WRITERS: &[BuiltinWriter] = &[
    BuiltinWriter { flag: TypeFlag::BooleanArray, matches: probe!(BoolArray), write: w_bool_array },
    BuiltinWriter { flag: TypeFlag::ByteArray, matches: probe!(ByteArray), write: w_byte_array },
    BuiltinWriter { flag: TypeFlag::CharArray, matches: probe!(CharArray), write: w_char_array },
    BuiltinWriter { flag: TypeFlag::ShortArray, matches: probe!(ShortArray), write: w_short_array },
    BuiltinWriter { flag: TypeFlag::IntArray, matches: probe!(IntArray), write: w_int_array },
    BuiltinWriter { flag: TypeFlag::LongArray, matches: probe!(LongArray), write: w_long_array },
    BuiltinWriter { flag: TypeFlag::FloatArray, matches: probe!(FloatArray), write: w_float_array },
    BuiltinWriter { flag: TypeFlag::DoubleArray, matches: probe!(DoubleArray), write: w_double_array },
    BuiltinWriter { flag: TypeFlag::ObjectArray, matches: probe!(Array), write: w_object_array },
    // List stays ahead of Iterable: first match wins.
    BuiltinWriter { flag: TypeFlag::List, matches: probe!(List), write: w_list },
    BuiltinWriter { flag: TypeFlag::Iterable, matches: probe!(Seq), write: w_seq },
    BuiltinWriter { flag: TypeFlag::Pair, matches: probe!(Pair), write: w_pair },
    BuiltinWriter { flag: TypeFlag::Triple, matches: probe!(Triple), write: w_triple },
    BuiltinWriter { flag: TypeFlag::MapEntry, matches: probe!(Entry), write: w_entry },
    BuiltinWriter { flag: TypeFlag::Map, matches: probe!(Map), write: w_map },
];

/// The opt-in fast path: primitive wrappers included, members trusted to be
/// non-null. Also the table used for built-in-as-super packets.
pub(crate) static NONNULL_WRITERS: &[BuiltinWriter] = &[
    BuiltinWriter { flag: TypeFlag::Boolean, matches: probe!(Bool), write: w_bool },
    BuiltinWriter { flag: TypeFlag::Byte, matches: probe!(Byte), write: w_byte },
    BuiltinWriter { flag: TypeFlag::Char, matches: probe!(Char), write: w_char },
    BuiltinWriter { flag: TypeFlag::Short, matches: probe!(Short), write: w_short },
    BuiltinWriter { flag: TypeFlag::Int, matches: probe!(Int), write: w_int },
    BuiltinWriter { flag: TypeFlag::Long, matches: probe!(Long), write: w_long },
    BuiltinWriter { flag: TypeFlag::Float, matches: probe!(Float), write: w_float },
    BuiltinWriter { flag: TypeFlag::Double, matches: probe!(Double), write: w_double },
    BuiltinWriter { flag: TypeFlag::BooleanArray, matches: probe!(BoolArray), write: w_bool_array },
    BuiltinWriter { flag: TypeFlag::ByteArray, matches: probe!(ByteArray), write: w_byte_array },
    BuiltinWriter { flag: TypeFlag::CharArray, matches: probe!(CharArray), write: w_char_array },
    BuiltinWriter { flag: TypeFlag::ShortArray, matches: probe!(ShortArray), write: w_short_array },
    BuiltinWriter { flag: TypeFlag::IntArray, matches: probe!(IntArray), write: w_int_array },
    BuiltinWriter { flag: TypeFlag::LongArray, matches: probe!(LongArray), write: w_long_array },
    BuiltinWriter { flag: TypeFlag::FloatArray, matches: probe!(FloatArray), write: w_float_array },
    BuiltinWriter { flag: TypeFlag::DoubleArray, matches: probe!(DoubleArray), write: w_double_array },
    BuiltinWriter { flag: TypeFlag::Str, matches: probe!(Str), write: w_str },
    BuiltinWriter { flag: TypeFlag::ObjectArray, matches: probe!(Array), write: w_object_array_nn },
    BuiltinWriter { flag: TypeFlag::List, matches: probe!(List), write: w_list_nn },
    BuiltinWriter { flag: TypeFlag::Iterable, matches: probe!(Seq), write: w_seq_nn },
    BuiltinWriter { flag: TypeFlag::Pair, matches: probe!(Pair), write: w_pair_nn },
    BuiltinWriter { flag: TypeFlag::Triple, matches: probe!(Triple), write: w_triple_nn },
    BuiltinWriter { flag: TypeFlag::MapEntry, matches: probe!(Entry), write: w_entry_nn },
    BuiltinWriter { flag: TypeFlag::Map, matches: probe!(Map), write: w_map_nn },
    BuiltinWriter { flag: TypeFlag::Unit, matches: probe!(Unit), write: w_unit },
];

// ---------------------------------------------------------------------------
// Read handlers
// ---------------------------------------------------------------------------

macro_rules! scalar_array_reader {
    ($fn_name:ident, $variant:ident) => {
        fn $fn_name(de: &mut Deserializer<'_>) -> Result<Value> {
            de.take_scalar_array().map(Value::$variant)
        }
    };
}

scalar_array_reader!(r_bool_array, BoolArray);
scalar_array_reader!(r_byte_array, ByteArray);
scalar_array_reader!(r_char_array, CharArray);
scalar_array_reader!(r_short_array, ShortArray);
scalar_array_reader!(r_int_array, IntArray);
scalar_array_reader!(r_long_array, LongArray);
scalar_array_reader!(r_float_array, FloatArray);
scalar_array_reader!(r_double_array, DoubleArray);

fn r_object_array(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_counted(false).map(Value::Array)
}

fn r_list(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_counted(false).map(Value::List)
}

fn r_seq(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_terminated(false).map(Value::Seq)
}

fn r_pair(de: &mut Deserializer<'_>) -> Result<Value> {
    let first = de.take_member(false)?;
    let second = de.take_member(false)?;
    Ok(Value::pair(first, second))
}

fn r_triple(de: &mut Deserializer<'_>) -> Result<Value> {
    let first = de.take_member(false)?;
    let second = de.take_member(false)?;
    let third = de.take_member(false)?;
    Ok(Value::triple(first, second, third))
}

fn r_entry(de: &mut Deserializer<'_>) -> Result<Value> {
    let key = de.take_member(false)?;
    let value = de.take_member(false)?;
    Ok(Value::entry(key, value))
}

fn r_map(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_map(false).map(Value::Map)
}

fn r_object_array_nn(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_counted(true).map(Value::Array)
}

fn r_list_nn(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_counted(true).map(Value::List)
}

fn r_seq_nn(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_terminated(true).map(Value::Seq)
}

fn r_pair_nn(de: &mut Deserializer<'_>) -> Result<Value> {
    let first = de.take_member(true)?;
    let second = de.take_member(true)?;
    Ok(Value::pair(first, second))
}

fn r_triple_nn(de: &mut Deserializer<'_>) -> Result<Value> {
    let first = de.take_member(true)?;
    let second = de.take_member(true)?;
    let third = de.take_member(true)?;
    Ok(Value::triple(first, second, third))
}

fn r_entry_nn(de: &mut Deserializer<'_>) -> Result<Value> {
    let key = de.take_member(true)?;
    let value = de.take_member(true)?;
    Ok(Value::entry(key, value))
}

fn r_map_nn(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_map(true).map(Value::Map)
}

fn r_bool(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_bool().map(Value::Bool)
}

fn r_byte(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_i8().map(Value::Byte)
}

fn r_char(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_char().map(Value::Char)
}

fn r_short(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_i16().map(Value::Short)
}

fn r_int(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_i32().map(Value::Int)
}

fn r_long(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_i64().map(Value::Long)
}

fn r_float(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_f32().map(Value::Float)
}

fn r_double(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_f64().map(Value::Double)
}

fn r_str(de: &mut Deserializer<'_>) -> Result<Value> {
    de.take_str_raw().map(Value::Str)
}

fn r_unit(_de: &mut Deserializer<'_>) -> Result<Value> {
    Ok(Value::Unit)
}

/// Read-side mirror of [`NULLABLE_WRITERS`].
pub(crate) static NULLABLE_READERS: &[BuiltinReader] = &[
    BuiltinReader { flag: TypeFlag::BooleanArray, read: r_bool_array },
    BuiltinReader { flag: TypeFlag::ByteArray, read: r_byte_array },
    BuiltinReader { flag: TypeFlag::CharArray, read: r_char_array },
    BuiltinReader { flag: TypeFlag::ShortArray, read: r_short_array },
    BuiltinReader { flag: TypeFlag::IntArray, read: r_int_array },
    BuiltinReader { flag: TypeFlag::LongArray, read: r_long_array },
    BuiltinReader { flag: TypeFlag::FloatArray, read: r_float_array },
    BuiltinReader { flag: TypeFlag::DoubleArray, read: r_double_array },
    BuiltinReader { flag: TypeFlag::ObjectArray, read: r_object_array },
    BuiltinReader { flag: TypeFlag::List, read: r_list },
    BuiltinReader { flag: TypeFlag::Iterable, read: r_seq },
    BuiltinReader { flag: TypeFlag::Pair, read: r_pair },
    BuiltinReader { flag: TypeFlag::Triple, read: r_triple },
    BuiltinReader { flag: TypeFlag::MapEntry, read: r_entry },
    BuiltinReader { flag: TypeFlag::Map, read: r_map },
];

/// Read-side mirror of [`NONNULL_WRITERS`].
pub(crate) static NONNULL_READERS: &[BuiltinReader] = &[
    BuiltinReader { flag: TypeFlag::Boolean, read: r_bool },
    BuiltinReader { flag: TypeFlag::Byte, read: r_byte },
    BuiltinReader { flag: TypeFlag::Char, read: r_char },
    BuiltinReader { flag: TypeFlag::Short, read: r_short },
    BuiltinReader { flag: TypeFlag::Int, read: r_int },
    BuiltinReader { flag: TypeFlag::Long, read: r_long },
    BuiltinReader { flag: TypeFlag::Float, read: r_float },
    BuiltinReader { flag: TypeFlag::Double, read: r_double },
    BuiltinReader { flag: TypeFlag::BooleanArray, read: r_bool_array },
    BuiltinReader { flag: TypeFlag::ByteArray, read: r_byte_array },
    BuiltinReader { flag: TypeFlag::CharArray, read: r_char_array },
    BuiltinReader { flag: TypeFlag::ShortArray, read: r_short_array },
    BuiltinReader { flag: TypeFlag::IntArray, read: r_int_array },
    BuiltinReader { flag: TypeFlag::LongArray, read: r_long_array },
    BuiltinReader { flag: TypeFlag::FloatArray, read: r_float_array },
    BuiltinReader { flag: TypeFlag::DoubleArray, read: r_double_array },
    BuiltinReader { flag: TypeFlag::Str, read: r_str },
    BuiltinReader { flag: TypeFlag::ObjectArray, read: r_object_array_nn },
    BuiltinReader { flag: TypeFlag::List, read: r_list_nn },
    BuiltinReader { flag: TypeFlag::Iterable, read: r_seq_nn },
    BuiltinReader { flag: TypeFlag::Pair, read: r_pair_nn },
    BuiltinReader { flag: TypeFlag::Triple, read: r_triple_nn },
    BuiltinReader { flag: TypeFlag::MapEntry, read: r_entry_nn },
    BuiltinReader { flag: TypeFlag::Map, read: r_map_nn },
    BuiltinReader { flag: TypeFlag::Unit, read: r_unit },
];
