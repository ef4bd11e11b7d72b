//! The dynamic value universe.
//!
//! [`Value`] is the engine's runtime representation of everything that can
//! travel over the wire: primitives, primitive arrays, the container shapes,
//! opaque function payloads, and user-typed objects behind an [`Obj`] handle.
//!
//! Each variant corresponds to exactly one wire tag, which is what replaces
//! the source model's runtime subtype checks: classification is a variant
//! match, and user-type polymorphism lives in the schema's declared links.
//!
//! # Example
//!
//! ```
//! use tagwire::Value;
//!
//! let n: Value = 42i32.into();
//! assert_eq!(n.as_int(), Some(42));
//!
//! let s: Value = "hello".into();
//! assert_eq!(s.as_str(), Some("hello"));
//!
//! let list = Value::List(vec![Value::Int(1), Value::Null]);
//! assert_eq!(list.as_list().map(<[Value]>::len), Some(2));
//! ```

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::flag::TypeFlag;

/// A dynamically typed value, one variant per wire shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The null value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed byte.
    Byte(i8),
    /// A character; encoded as one UTF-16 code unit.
    Char(char),
    /// 16-bit signed integer.
    Short(i16),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Packed boolean array.
    BoolArray(Vec<bool>),
    /// Packed byte array.
    ByteArray(Vec<i8>),
    /// Packed character array.
    CharArray(Vec<char>),
    /// Packed 16-bit integer array.
    ShortArray(Vec<i16>),
    /// Packed 32-bit integer array.
    IntArray(Vec<i32>),
    /// Packed 64-bit integer array.
    LongArray(Vec<i64>),
    /// Packed 32-bit float array.
    FloatArray(Vec<f32>),
    /// Packed 64-bit float array.
    DoubleArray(Vec<f64>),
    /// UTF-8 string.
    Str(String),
    /// Fixed-size array of heterogeneous values, length-prefixed on the wire.
    Array(Vec<Value>),
    /// List of heterogeneous values, length-prefixed on the wire.
    List(Vec<Value>),
    /// A sequence of unknown length; written without a count and terminated
    /// by `END_OBJECT`. Equality is over the materialized finite sequence.
    Seq(Vec<Value>),
    /// Two values.
    Pair(Box<Value>, Box<Value>),
    /// Three values.
    Triple(Box<Value>, Box<Value>, Box<Value>),
    /// A single key/value entry.
    Entry(Box<Value>, Box<Value>),
    /// An insertion-ordered map, stored as key/value pairs. Generic keys are
    /// not hashable, so the pair list is the engine's map representation.
    Map(Vec<(Value, Value)>),
    /// The zero-sized singleton.
    Unit,
    /// An opaque payload produced by the external encoder for values that
    /// cannot be named. Byte equality only; never compare decoded functions.
    Function(Vec<u8>),
    /// A user-typed value governed by a schema protocol.
    Object(Obj),
}

impl Value {
    /// Builds a pair without boxing at the call site.
    #[must_use]
    pub fn pair(first: Value, second: Value) -> Self {
        Self::Pair(Box::new(first), Box::new(second))
    }

    /// Builds a triple without boxing at the call site.
    #[must_use]
    pub fn triple(first: Value, second: Value, third: Value) -> Self {
        Self::Triple(Box::new(first), Box::new(second), Box::new(third))
    }

    /// Builds a map entry without boxing at the call site.
    #[must_use]
    pub fn entry(key: Value, value: Value) -> Self {
        Self::Entry(Box::new(key), Box::new(value))
    }

    /// Wraps a user-typed value in an [`Obj`] handle.
    #[must_use]
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Self::Object(Obj::new(value))
    }

    /// Returns the boolean, if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer, if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the integer, if this is a `Long`.
    #[must_use]
    pub const fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float, if this is a `Double`.
    #[must_use]
    pub const fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements, if this is a `List`.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the object handle, if this is an `Object`.
    #[must_use]
    pub const fn as_object(&self) -> Option<&Obj> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Returns `true` if this is `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The wire tag this value is introduced by.
    #[must_use]
    pub const fn flag(&self) -> TypeFlag {
        match self {
            Self::Null => TypeFlag::Null,
            Self::Bool(_) => TypeFlag::Boolean,
            Self::Byte(_) => TypeFlag::Byte,
            Self::Char(_) => TypeFlag::Char,
            Self::Short(_) => TypeFlag::Short,
            Self::Int(_) => TypeFlag::Int,
            Self::Long(_) => TypeFlag::Long,
            Self::Float(_) => TypeFlag::Float,
            Self::Double(_) => TypeFlag::Double,
            Self::BoolArray(_) => TypeFlag::BooleanArray,
            Self::ByteArray(_) => TypeFlag::ByteArray,
            Self::CharArray(_) => TypeFlag::CharArray,
            Self::ShortArray(_) => TypeFlag::ShortArray,
            Self::IntArray(_) => TypeFlag::IntArray,
            Self::LongArray(_) => TypeFlag::LongArray,
            Self::FloatArray(_) => TypeFlag::FloatArray,
            Self::DoubleArray(_) => TypeFlag::DoubleArray,
            Self::Str(_) => TypeFlag::Str,
            Self::Array(_) => TypeFlag::ObjectArray,
            Self::List(_) => TypeFlag::List,
            Self::Seq(_) => TypeFlag::Iterable,
            Self::Pair(..) => TypeFlag::Pair,
            Self::Triple(..) => TypeFlag::Triple,
            Self::Entry(..) => TypeFlag::MapEntry,
            Self::Map(_) => TypeFlag::Map,
            Self::Unit => TypeFlag::Unit,
            Self::Function(_) => TypeFlag::Function,
            Self::Object(_) => TypeFlag::Object,
        }
    }
}

/// A shared handle to a user-typed value.
///
/// The handle carries the value behind `Arc<dyn Any>` together with the Rust
/// type name for diagnostics. Protocol identity is the schema-registered
/// name, not the Rust path; the handle only answers `TypeId` queries.
///
/// Equality is handle identity. Two independently deserialized objects never
/// compare equal through `Obj`; compare the downcast values instead.
#[derive(Clone)]
pub struct Obj {
    rust_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Obj {
    /// Wraps a value.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self { rust_name: std::any::type_name::<T>(), inner: Arc::new(value) }
    }

    /// The `TypeId` of the wrapped value.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        (*self.inner).type_id()
    }

    /// The Rust type name of the wrapped value, for diagnostics only.
    #[must_use]
    pub const fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    /// Returns `true` if the wrapped value is a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        (*self.inner).is::<T>()
    }

    /// Borrows the wrapped value as a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.inner).downcast_ref::<T>()
    }

    /// Borrows the wrapped value dynamically, for dispatch.
    pub(crate) fn as_any(&self) -> &dyn Any {
        &*self.inner
    }

    /// Unwraps into the concrete value.
    ///
    /// # Errors
    ///
    /// Returns a type mismatch if the wrapped value is not a `T`, or if the
    /// handle has been cloned and the value is still shared.
    pub fn downcast<T: Any + Send + Sync>(self) -> Result<T> {
        let rust_name = self.rust_name;
        let arc = self
            .inner
            .downcast::<T>()
            .map_err(|_| Error::type_mismatch(std::any::type_name::<T>(), rust_name))?;
        Arc::try_unwrap(arc)
            .map_err(|_| Error::type_mismatch(std::any::type_name::<T>(), "a shared handle"))
    }
}

impl std::fmt::Debug for Obj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Obj<{}>", self.rust_name)
    }
}

impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => Byte,
    char => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => Str,
    Vec<bool> => BoolArray,
    Vec<i8> => ByteArray,
    Vec<char> => CharArray,
    Vec<i16> => ShortArray,
    Vec<i32> => IntArray,
    Vec<i64> => LongArray,
    Vec<f32> => FloatArray,
    Vec<f64> => DoubleArray,
    Vec<Value> => List,
    Vec<(Value, Value)> => Map,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Unit
    }
}

/// Conversion out of the dynamic universe, used by typed generic reads.
pub trait FromValue: Sized {
    /// Converts a decoded [`Value`] into `Self`.
    ///
    /// # Errors
    ///
    /// Returns a type mismatch if the value has a different shape.
    fn from_value(value: Value) -> Result<Self>;
}

fn shape_mismatch(expected: &str, got: &Value) -> Error {
    Error::type_mismatch(expected, got.flag().name())
}

macro_rules! from_value {
    ($($ty:ty => $variant:ident / $name:literal),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(shape_mismatch($name, &other)),
                    }
                }
            }
        )*
    };
}

from_value! {
    bool => Bool / "BOOLEAN",
    i8 => Byte / "BYTE",
    char => Char / "CHAR",
    i16 => Short / "SHORT",
    i32 => Int / "INT",
    i64 => Long / "LONG",
    f32 => Float / "FLOAT",
    f64 => Double / "DOUBLE",
    String => Str / "STRING",
    Vec<bool> => BoolArray / "BOOLEAN_ARRAY",
    Vec<i8> => ByteArray / "BYTE_ARRAY",
    Vec<char> => CharArray / "CHAR_ARRAY",
    Vec<i16> => ShortArray / "SHORT_ARRAY",
    Vec<i32> => IntArray / "INT_ARRAY",
    Vec<i64> => LongArray / "LONG_ARRAY",
    Vec<f32> => FloatArray / "FLOAT_ARRAY",
    Vec<f64> => DoubleArray / "DOUBLE_ARRAY",
    Vec<(Value, Value)> => Map / "MAP",
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for () {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Unit => Ok(()),
            other => Err(shape_mismatch("UNIT", &other)),
        }
    }
}

/// Any of the three sequence shapes materializes into a `Vec<Value>`.
impl FromValue for Vec<Value> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) | Value::List(items) | Value::Seq(items) => Ok(items),
            other => Err(shape_mismatch("LIST", &other)),
        }
    }
}

impl FromValue for (Value, Value) {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Pair(a, b) | Value::Entry(a, b) => Ok((*a, *b)),
            other => Err(shape_mismatch("PAIR", &other)),
        }
    }
}

impl FromValue for (Value, Value, Value) {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Triple(a, b, c) => Ok((*a, *b, *c)),
            other => Err(shape_mismatch("TRIPLE", &other)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn from_impls() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i32), Value::Int(42));
        assert_eq!(Value::from("hi"), Value::Str("hi".to_owned()));
        assert_eq!(Value::from(vec![1i32, 2]), Value::IntArray(vec![1, 2]));
        assert_eq!(Value::from(()), Value::Unit);
    }

    #[test]
    fn flags_match_variants() {
        assert_eq!(Value::Null.flag(), TypeFlag::Null);
        assert_eq!(Value::Int(1).flag(), TypeFlag::Int);
        assert_eq!(Value::Seq(vec![]).flag(), TypeFlag::Iterable);
        assert_eq!(Value::pair(Value::Unit, Value::Null).flag(), TypeFlag::Pair);
    }

    #[test]
    fn obj_handle_identity() {
        let a = Obj::new(42i32);
        let b = a.clone();
        let c = Obj::new(42i32);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.is::<i32>());
        assert_eq!(a.downcast_ref::<i32>(), Some(&42));
    }

    #[test]
    fn obj_downcast_consumes() {
        let obj = Obj::new(String::from("payload"));
        assert_eq!(obj.downcast::<String>().unwrap(), "payload");

        let obj = Obj::new(1u8);
        assert!(obj.downcast::<u16>().is_err());
    }

    #[test]
    fn from_value_conversions() {
        assert_eq!(i32::from_value(Value::Int(7)).unwrap(), 7);
        assert!(i32::from_value(Value::Str("no".into())).is_err());
        let items = Vec::<Value>::from_value(Value::Seq(vec![Value::Unit])).unwrap();
        assert_eq!(items, vec![Value::Unit]);
        let (k, v) = <(Value, Value)>::from_value(Value::entry(1i32.into(), 2i32.into())).unwrap();
        assert_eq!((k, v), (Value::Int(1), Value::Int(2)));
    }
}
