//! The hook pair for opaque values.
//!
//! Values that cannot be named (function objects and similar) are not
//! encoded by the engine itself. They are tagged `FUNCTION`, length-framed,
//! and handed to an external [`OpaqueCodec`]. The engine specifies only the
//! tag and the framing; what the payload means is the codec's business.

use std::any::Any;

use crate::error::Result;
use crate::value::Obj;

/// An external encoder/decoder for opaque values.
///
/// Used exclusively for the `FUNCTION` tag. Serializing an unnameable value
/// without a codec installed fails with a missing operation; an engine
/// embedding may refuse to provide one entirely, which leaves every other
/// tag unaffected.
pub trait OpaqueCodec {
    /// Encodes an opaque value into a standalone payload.
    ///
    /// During schema self-serialization the value handed in is one of the
    /// engine's own op handles ([`crate::ReadOp`], [`crate::WriteOp`] or
    /// [`crate::schema::BuiltinBase`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the codec cannot represent the value.
    fn encode(&self, value: &dyn Any) -> Result<Vec<u8>>;

    /// Decodes a payload previously produced by [`OpaqueCodec::encode`].
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not recognized.
    fn decode(&self, bytes: &[u8]) -> Result<Obj>;
}
