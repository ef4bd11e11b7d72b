//! `tagwire` - a schema-driven binary serialization engine
//!
//! This crate encodes in-process values into a compact, self-describing byte
//! stream and decodes them back, governed by a user-declared [`Schema`] of
//! per-type read/write protocols.
//!
//! # Overview
//!
//! Three pieces carry the weight:
//!
//! - **Dispatch**: a value is classified as a primitive, a built-in
//!   container shape, an opaque unnameable, or a user type; user types
//!   resolve their writer through declared supertype links.
//! - **Supertype packets**: a subtype's `OBJECT` block embeds one
//!   self-framed packet per ancestor writer. The subtype's reader retrieves
//!   each packet by name through a frame-scoped mini-deserializer, so no
//!   runtime base-class machinery exists anywhere.
//! - **The tagged wire format**: every value starts with a one-byte
//!   [`TypeFlag`]; integers are big-endian, strings length-prefixed UTF-8,
//!   and `OBJECT` blocks are terminated by `END_OBJECT`.
//!
//! # Quick Start
//!
//! ```
//! use tagwire::{Deserializer, Schema, Serializer};
//!
//! #[derive(Debug, PartialEq)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! let mut builder = Schema::builder();
//! builder
//!     .define::<Point>("Point")
//!     .write(|ser, p| {
//!         ser.write_int(p.x)?;
//!         ser.write_int(p.y)
//!     })
//!     .read(|de| Ok(Point { x: de.read_int()?, y: de.read_int()? }));
//! let schema = builder.build()?;
//!
//! let mut bytes = Vec::new();
//! let mut ser = Serializer::new(&mut bytes, &schema);
//! ser.write(&Point { x: 3, y: 4 })?;
//!
//! let mut cursor = std::io::Cursor::new(bytes);
//! let mut de = Deserializer::new(&mut cursor, &schema);
//! let point = de.read_object::<Point>()?;
//! assert_eq!(point, Some(Point { x: 3, y: 4 }));
//! # Ok::<(), tagwire::Error>(())
//! ```
//!
//! # Polymorphism
//!
//! Supertype links are declared, not inherited: `define_open` registers an
//! extensible type, `extends` links a subtype to it, and writing a subtype
//! emits one packet per ancestor writer in declaration order. A reader
//! declared with `fallback` stands in for subtypes that have no reader of
//! their own.
//!
//! # Threading
//!
//! A built [`Schema`] is immutable and freely shared across threads.
//! [`Serializer`] and [`Deserializer`] hold a stream position and are
//! single-threaded. Schema *construction* is single-threaded unless opted
//! in through [`SchemaOptions`] and [`SharedSchemaBuilder`].
//!
//! # Modules
//!
//! - [`flag`] - the one-byte wire tags
//! - [`io`] - byte sink/source seams over `std::io`
//! - [`value`] - the dynamic [`Value`] universe
//! - [`schema`] - protocols, the builder, and the frozen registry
//! - [`ser`] / [`de`] - the serializer and deserializer
//! - [`opaque`] - the escape hatch for unnameable values
//! - [`error`] - error types ([`enum@Error`])

pub mod de;
pub mod error;
pub mod flag;
pub mod io;
pub mod opaque;
pub mod schema;
pub mod ser;
pub mod value;

mod builtin;


// Re-export the working surface.
pub use de::Deserializer;
pub use error::{Error, Result};
pub use flag::TypeFlag;
pub use io::{ByteSink, ByteSource};
pub use opaque::OpaqueCodec;
pub use schema::{
    BuiltinBase, Protocol, ReadOp, Schema, SchemaBuilder, SchemaOptions, SharedSchemaBuilder,
    TypeDef, TypeKind, Upcast, WriteOp,
};
pub use ser::Serializer;
pub use value::{FromValue, Obj, Value};
