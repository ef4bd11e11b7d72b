//! Per-type protocol records.
//!
//! A [`Protocol`] bundles the optional read and write operations declared
//! for one type, its modifiers, and its place in the declared hierarchy.
//! The operations are first-class values: clonable handles around the
//! user's closures, bound to the `TypeId` they were defined for.

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::de::Deserializer;
use crate::error::{Error, Result};
use crate::ser::Serializer;
use crate::value::{Obj, Value};

pub(crate) type WriteFn = dyn Fn(&mut Serializer<'_>, &dyn Any) -> Result<()> + Send + Sync;
pub(crate) type ReadFn = dyn Fn(&mut Deserializer<'_>) -> Result<Obj> + Send + Sync;
pub(crate) type ProjectFn = dyn Fn(&dyn Any) -> Result<Value> + Send + Sync;
pub(crate) type UpcastFn = dyn for<'v> Fn(&'v dyn Any) -> Result<&'v dyn Any> + Send + Sync;

fn as_upcast(
    f: impl for<'v> Fn(&'v dyn Any) -> Result<&'v dyn Any> + Send + Sync + 'static,
) -> Arc<UpcastFn> {
    Arc::new(f)
}

/// How a registered type may participate in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Concrete and closed: nothing may extend it, no fallback allowed.
    Final,
    /// Concrete and extensible.
    Open,
    /// Non-instantiable: only a fallback reader may materialize it.
    Abstract,
}

/// A first-class write operation.
///
/// Wraps the user's typed closure behind a downcast shim so the dispatch
/// core can drive it with `&dyn Any`.
#[derive(Clone)]
pub struct WriteOp {
    pub(crate) type_id: TypeId,
    pub(crate) f: Arc<WriteFn>,
}

impl WriteOp {
    /// Wraps a typed write closure.
    pub fn new<T, F>(f: F) -> Self
    where
        T: Any,
        F: Fn(&mut Serializer<'_>, &T) -> Result<()> + Send + Sync + 'static,
    {
        let shim: Arc<WriteFn> = Arc::new(move |ser, any| match any.downcast_ref::<T>() {
            Some(value) => f(ser, value),
            None => Err(Error::type_mismatch(std::any::type_name::<T>(), "a different runtime type")),
        });
        Self { type_id: TypeId::of::<T>(), f: shim }
    }

    /// The `TypeId` this operation was defined for.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn invoke(&self, ser: &mut Serializer<'_>, value: &dyn Any) -> Result<()> {
        (self.f)(ser, value)
    }
}

impl PartialEq for WriteOp {
    /// Operation identity: two handles are equal when they share a closure.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

impl std::fmt::Debug for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WriteOp")
    }
}

/// A first-class read operation.
#[derive(Clone)]
pub struct ReadOp {
    pub(crate) type_id: TypeId,
    pub(crate) f: Arc<ReadFn>,
}

impl ReadOp {
    /// Wraps a typed read closure.
    pub fn new<T, F>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut Deserializer<'_>) -> Result<T> + Send + Sync + 'static,
    {
        let shim: Arc<ReadFn> = Arc::new(move |de| f(de).map(Obj::new));
        Self { type_id: TypeId::of::<T>(), f: shim }
    }

    /// The `TypeId` this operation was defined for.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn invoke(&self, de: &mut Deserializer<'_>) -> Result<Obj> {
        (self.f)(de)
    }
}

impl PartialEq for ReadOp {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

impl std::fmt::Debug for ReadOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReadOp")
    }
}

/// The declared view of a subtype as its supertype.
///
/// Rust has no subtyping between user types, so a supertype link carries an
/// explicit projection - typically a field access into the embedded
/// supertype value. Ancestor writers run against the projected view.
#[derive(Clone)]
pub struct Upcast {
    pub(crate) type_id: TypeId,
    pub(crate) f: Arc<UpcastFn>,
}

impl Upcast {
    /// Wraps a typed projection from subtype to supertype.
    pub fn new<T, S, F>(f: F) -> Self
    where
        T: Any,
        S: Any,
        F: Fn(&T) -> &S + Send + Sync + 'static,
    {
        let shim = as_upcast(move |any| match any.downcast_ref::<T>() {
            Some(value) => Ok(f(value) as &dyn Any),
            None => Err(Error::type_mismatch(std::any::type_name::<T>(), "a different runtime type")),
        });
        Self { type_id: TypeId::of::<T>(), f: shim }
    }

    pub(crate) fn apply<'v>(&self, value: &'v dyn Any) -> Result<&'v dyn Any> {
        (self.f)(value)
    }
}

impl PartialEq for Upcast {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

impl std::fmt::Debug for Upcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Upcast")
    }
}

/// A declared built-in base: the projection that produces the built-in view
/// of a user type, written as the built-in-as-super packet.
#[derive(Clone)]
pub struct BuiltinBase {
    pub(crate) type_id: TypeId,
    pub(crate) project: Arc<ProjectFn>,
}

impl BuiltinBase {
    /// Wraps a typed projection.
    pub fn new<T, F>(f: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let shim: Arc<ProjectFn> = Arc::new(move |any| match any.downcast_ref::<T>() {
            Some(value) => Ok(f(value)),
            None => Err(Error::type_mismatch(std::any::type_name::<T>(), "a different runtime type")),
        });
        Self { type_id: TypeId::of::<T>(), project: shim }
    }

    pub(crate) fn apply(&self, value: &dyn Any) -> Result<Value> {
        (self.project)(value)
    }
}

impl PartialEq for BuiltinBase {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.project, &other.project)
    }
}

impl std::fmt::Debug for BuiltinBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BuiltinBase")
    }
}

/// The per-type record: operations, modifiers, and hierarchy links.
#[derive(Debug, Clone)]
pub struct Protocol {
    pub(crate) name: String,
    pub(crate) type_id: Option<TypeId>,
    pub(crate) kind: TypeKind,
    pub(crate) parent: Option<String>,
    pub(crate) upcast: Option<Upcast>,
    pub(crate) builtin_base: Option<BuiltinBase>,
    pub(crate) read: Option<ReadOp>,
    pub(crate) write: Option<WriteOp>,
    pub(crate) has_fallback: bool,
    pub(crate) has_static: bool,
}

impl Protocol {
    /// The schema-registered type name; this is the wire identity.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How the type participates in the hierarchy.
    #[must_use]
    pub const fn kind(&self) -> TypeKind {
        self.kind
    }

    /// The declared supertype's name, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// The read operation, if one was declared.
    #[must_use]
    pub const fn read_op(&self) -> Option<&ReadOp> {
        self.read.as_ref()
    }

    /// The write operation, if one was declared.
    #[must_use]
    pub const fn write_op(&self) -> Option<&WriteOp> {
        self.write.as_ref()
    }

    /// Whether the read operation may materialize this type for subtypes
    /// without their own reader.
    #[must_use]
    pub const fn has_fallback(&self) -> bool {
        self.has_fallback
    }

    /// Whether the write operation emits only its own bytes, suppressing
    /// supertype packets and forbidding subtype writers.
    #[must_use]
    pub const fn has_static(&self) -> bool {
        self.has_static
    }

    /// Recovers the runtime type binding from the ops after a schema
    /// reload; the name string is the only identity that crosses streams.
    pub(crate) fn rebind_type_id(&mut self) {
        if self.type_id.is_none() {
            self.type_id = self
                .read
                .as_ref()
                .map(|op| op.type_id)
                .or_else(|| self.write.as_ref().map(|op| op.type_id))
                .or_else(|| self.upcast.as_ref().map(|up| up.type_id))
                .or_else(|| self.builtin_base.as_ref().map(|base| base.type_id));
        }
    }
}
