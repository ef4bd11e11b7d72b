//! Schema construction.
//!
//! Protocols are declared through a [`SchemaBuilder`] and frozen into an
//! immutable [`Schema`](super::Schema) by [`SchemaBuilder::build`]. The
//! read/write slots are write-only configuration: [`TypeDef`] exposes
//! setters and nothing else, and every illegal declaration is recorded and
//! reported as a malformed protocol at build time, the earliest point the
//! whole picture is known.
//!
//! # Example
//!
//! ```
//! use tagwire::{Schema, SchemaBuilder};
//!
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! let mut builder = SchemaBuilder::new();
//! builder
//!     .define::<Point>("Point")
//!     .write(|ser, p| {
//!         ser.write_int(p.x)?;
//!         ser.write_int(p.y)
//!     })
//!     .read(|de| Ok(Point { x: de.read_int()?, y: de.read_int()? }));
//! let schema: Schema = builder.build()?;
//! # Ok::<(), tagwire::Error>(())
//! ```

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::de::Deserializer;
use crate::error::{Error, Result};
use crate::ser::{is_builtin_type_id, Serializer};
use crate::value::Value;

use super::protocol::{BuiltinBase, Protocol, ReadOp, TypeKind, Upcast, WriteOp};
use super::Schema;

/// Options recognized at schema construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaOptions {
    /// Whether the builder may be driven from multiple threads during
    /// definition. The default builder assumes single-thread use.
    pub thread_safe: bool,
}

#[derive(Default)]
pub(crate) struct TypeDefState {
    name: String,
    type_id: Option<TypeId>,
    kind: Option<TypeKind>,
    parent: Option<TypeId>,
    upcast: Option<Upcast>,
    builtin_base: Option<BuiltinBase>,
    read: Option<ReadOp>,
    write: Option<WriteOp>,
    has_fallback: bool,
    has_static: bool,
    errors: Vec<String>,
}

impl TypeDefState {
    fn fail(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }
}

/// Collects protocol declarations and freezes them into a schema.
#[derive(Default)]
pub struct SchemaBuilder {
    options: SchemaOptions,
    defs: Vec<TypeDefState>,
}

impl SchemaBuilder {
    /// Creates a builder with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder with the given options.
    #[must_use]
    pub fn with_options(options: SchemaOptions) -> Self {
        Self { options, ..Self::default() }
    }

    /// Declares a protocol slot for a final concrete type.
    pub fn define<T: Any + Send + Sync>(&mut self, name: impl Into<String>) -> TypeDef<'_, T> {
        self.define_kind(name.into(), TypeKind::Final)
    }

    /// Declares a protocol slot for an extensible concrete type.
    pub fn define_open<T: Any + Send + Sync>(&mut self, name: impl Into<String>) -> TypeDef<'_, T> {
        self.define_kind(name.into(), TypeKind::Open)
    }

    /// Declares a protocol slot for an abstract type: one that only a
    /// fallback reader may materialize.
    pub fn define_abstract<T: Any + Send + Sync>(
        &mut self,
        name: impl Into<String>,
    ) -> TypeDef<'_, T> {
        self.define_kind(name.into(), TypeKind::Abstract)
    }

    fn define_kind<T: Any + Send + Sync>(&mut self, name: String, kind: TypeKind) -> TypeDef<'_, T> {
        let type_id = TypeId::of::<T>();
        let rust_name = std::any::type_name::<T>();
        let mut state = TypeDefState {
            name: name.clone(),
            type_id: Some(type_id),
            kind: Some(kind),
            ..TypeDefState::default()
        };

        if rust_name.contains("{{closure}}") {
            state.fail(format!("`{name}`: anonymous or locally-scoped types cannot be named"));
        }
        if name == super::encode::SCHEMA_WIRE_NAME {
            state.fail(format!("`{name}` is reserved for the engine"));
        }
        if is_builtin_type_id(type_id) {
            state.fail(format!("`{name}`: type `{rust_name}` is already covered by a built-in"));
        }
        if self.defs.iter().any(|def| def.name == name) {
            state.fail(format!("type name `{name}` declared twice"));
        }
        if self.defs.iter().any(|def| def.type_id == Some(type_id)) {
            state.fail(format!("`{name}`: a protocol for `{rust_name}` is already declared"));
        }

        self.defs.push(state);
        let index = self.defs.len() - 1;
        TypeDef { state: &mut self.defs[index], _type: PhantomData }
    }

    /// Converts into a clonable, mutex-guarded builder usable from multiple
    /// threads.
    ///
    /// # Errors
    ///
    /// Fails unless the builder was created with
    /// [`SchemaOptions::thread_safe`] set.
    pub fn into_shared(self) -> Result<SharedSchemaBuilder> {
        if !self.options.thread_safe {
            return Err(Error::malformed("builder was not configured for thread-safe use"));
        }
        Ok(SharedSchemaBuilder { inner: Arc::new(Mutex::new(self)) })
    }

    /// Validates every declaration and freezes the schema.
    ///
    /// # Errors
    ///
    /// Fails with a malformed protocol describing the first offending
    /// declaration.
    pub fn build(self) -> Result<Schema> {
        for def in &self.defs {
            if let Some(msg) = def.errors.first() {
                return Err(Error::malformed(msg.clone()));
            }
        }

        let mut protocols = Vec::with_capacity(self.defs.len());
        for def in &self.defs {
            let parent = match def.parent {
                None => None,
                Some(parent_id) => {
                    let Some(parent_def) = self.defs.iter().find(|d| d.type_id == Some(parent_id))
                    else {
                        return Err(Error::malformed(format!(
                            "`{}`: supertype is not defined in this schema",
                            def.name
                        )));
                    };
                    Some(parent_def.name.clone())
                }
            };
            protocols.push(Protocol {
                name: def.name.clone(),
                type_id: def.type_id,
                kind: def.kind.unwrap_or(TypeKind::Final),
                parent,
                upcast: def.upcast.clone(),
                builtin_base: def.builtin_base.clone(),
                read: def.read.clone(),
                write: def.write.clone(),
                has_fallback: def.has_fallback,
                has_static: def.has_static,
            });
        }
        Schema::finalize(protocols)
    }
}

/// The write-only configuration surface for one type's protocol.
///
/// Setters record each declaration; illegal combinations surface from
/// [`SchemaBuilder::build`]. There are no getters: composing behavior out of
/// a half-built protocol is not a supported move.
pub struct TypeDef<'b, T> {
    state: &'b mut TypeDefState,
    _type: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> TypeDef<'_, T> {
    /// Assigns the read operation.
    pub fn read<F>(self, f: F) -> Self
    where
        F: Fn(&mut Deserializer<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.assign_read(ReadOp::new(f), false)
    }

    /// Assigns a fallback read operation: one that may materialize a `T`
    /// for subtypes without their own reader.
    pub fn fallback<F>(self, f: F) -> Self
    where
        F: Fn(&mut Deserializer<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.assign_read(ReadOp::new(f), true)
    }

    /// Assigns the write operation.
    pub fn write<F>(self, f: F) -> Self
    where
        F: Fn(&mut Serializer<'_>, &T) -> Result<()> + Send + Sync + 'static,
    {
        self.assign_write(WriteOp::new(f), false)
    }

    /// Assigns a static write operation: it emits only its own bytes,
    /// supertype packets are suppressed, and no subtype may declare a
    /// writer.
    pub fn static_write<F>(self, f: F) -> Self
    where
        F: Fn(&mut Serializer<'_>, &T) -> Result<()> + Send + Sync + 'static,
    {
        self.assign_write(WriteOp::new(f), true)
    }

    /// Declares the single supertype link.
    ///
    /// Rust has no subtyping, so the link carries the projection that views
    /// a `T` as its supertype - typically a borrow of the embedded
    /// supertype field. Ancestor writers run against the projected view.
    pub fn extends<S, F>(mut self, project: F) -> Self
    where
        S: Any,
        F: Fn(&T) -> &S + Send + Sync + 'static,
    {
        if self.state.parent.is_some() {
            let name = self.state.name.clone();
            self.state.fail(format!("`{name}`: supertype declared twice"));
            return self;
        }
        if TypeId::of::<S>() == TypeId::of::<T>() {
            let name = self.state.name.clone();
            self.state.fail(format!("`{name}`: a type cannot extend itself"));
            return self;
        }
        self.state.parent = Some(TypeId::of::<S>());
        self.state.upcast = Some(Upcast::new(project));
        self
    }

    /// Declares a built-in base: the projection producing the built-in view
    /// written as the trailing supertype packet.
    pub fn extends_builtin<F>(mut self, projection: F) -> Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        if self.state.builtin_base.is_some() {
            let name = self.state.name.clone();
            self.state.fail(format!("`{name}`: built-in base declared twice"));
            return self;
        }
        self.state.builtin_base = Some(BuiltinBase::new(projection));
        self
    }

    fn assign_read(mut self, op: ReadOp, fallback: bool) -> Self {
        let name = self.state.name.clone();
        if self.state.read.is_some() {
            self.state.fail(format!("`{name}`: read assigned twice"));
            return self;
        }
        match (self.state.kind, fallback) {
            (Some(TypeKind::Abstract), false) => {
                self.state.fail(format!("`{name}`: abstract types take only fallback readers"));
            }
            (Some(TypeKind::Final), true) => {
                self.state.fail(format!("`{name}`: fallback on a final type"));
            }
            _ => {
                self.state.read = Some(op);
                self.state.has_fallback = fallback;
            }
        }
        self
    }

    fn assign_write(mut self, op: WriteOp, is_static: bool) -> Self {
        let name = self.state.name.clone();
        if self.state.write.is_some() {
            self.state.fail(format!("`{name}`: write assigned twice"));
            return self;
        }
        self.state.write = Some(op);
        self.state.has_static = is_static;
        self
    }
}

/// A clonable, mutex-guarded builder for multi-threaded definition.
///
/// Obtained from [`SchemaBuilder::into_shared`] after opting in through
/// [`SchemaOptions::thread_safe`].
#[derive(Clone)]
pub struct SharedSchemaBuilder {
    inner: Arc<Mutex<SchemaBuilder>>,
}

impl SharedSchemaBuilder {
    /// Declares a final concrete type under the lock.
    ///
    /// # Errors
    ///
    /// Fails if another thread panicked while holding the builder.
    pub fn with<T, F>(&self, name: impl Into<String>, configure: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: FnOnce(TypeDef<'_, T>) -> TypeDef<'_, T>,
    {
        let mut guard = self.lock()?;
        let def = guard.define::<T>(name);
        let _ = configure(def);
        Ok(())
    }

    /// Declares an extensible concrete type under the lock.
    ///
    /// # Errors
    ///
    /// Fails if another thread panicked while holding the builder.
    pub fn with_open<T, F>(&self, name: impl Into<String>, configure: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: FnOnce(TypeDef<'_, T>) -> TypeDef<'_, T>,
    {
        let mut guard = self.lock()?;
        let def = guard.define_open::<T>(name);
        let _ = configure(def);
        Ok(())
    }

    /// Declares an abstract type under the lock.
    ///
    /// # Errors
    ///
    /// Fails if another thread panicked while holding the builder.
    pub fn with_abstract<T, F>(&self, name: impl Into<String>, configure: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: FnOnce(TypeDef<'_, T>) -> TypeDef<'_, T>,
    {
        let mut guard = self.lock()?;
        let def = guard.define_abstract::<T>(name);
        let _ = configure(def);
        Ok(())
    }

    /// Validates and freezes the schema, leaving the shared builder empty.
    ///
    /// # Errors
    ///
    /// Fails with a malformed protocol exactly as [`SchemaBuilder::build`]
    /// does.
    pub fn build(&self) -> Result<Schema> {
        let builder = std::mem::take(&mut *self.lock()?);
        builder.build()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SchemaBuilder>> {
        self.inner.lock().map_err(|_| Error::malformed("thread-safe builder lock poisoned"))
    }
}
