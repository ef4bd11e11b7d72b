//! Error types for the engine.

use thiserror::Error;

/// Errors that can occur while building schemas or moving values over the wire.
///
/// Protocol errors are detected as early as possible, preferably while the
/// schema is being built. Runtime errors surface to the caller of the
/// top-level operation; none are silently recovered.
#[derive(Debug, Error)]
pub enum Error {
    /// A protocol was declared inconsistently: duplicate read/write
    /// assignment, an illegal fallback or static modifier, a redefined
    /// built-in, or a broken supertype link.
    #[error("malformed protocol: {0}")]
    MalformedProtocol(String),

    /// No read or write operation could be resolved for a runtime value.
    #[error("missing operation: {0}")]
    MissingOperation(String),

    /// The tag read from the stream does not match the typed operation
    /// invoked, or a value had a different shape than its protocol expects.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected shape or tag.
        expected: String,
        /// The shape or tag actually seen.
        actual: String,
    },

    /// The stream violated the wire grammar: a missing `END_OBJECT`,
    /// an unknown tag byte, or a stream that ended mid-value.
    #[error("framing error: {0}")]
    Framing(String),

    /// An error surfaced from the underlying byte stream, unwrapped.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a malformed-protocol error.
    #[must_use]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedProtocol(msg.into())
    }

    /// Creates a missing-operation error.
    #[must_use]
    pub fn missing_op(msg: impl Into<String>) -> Self {
        Self::MissingOperation(msg.into())
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch { expected: expected.into(), actual: actual.into() }
    }

    /// Creates a framing error.
    #[must_use]
    pub fn framing(msg: impl Into<String>) -> Self {
        Self::Framing(msg.into())
    }

    /// Returns `true` if this error was raised at schema-build time.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(self, Self::MalformedProtocol(_))
    }

    /// Returns `true` if this error indicates a corrupt or truncated stream.
    #[must_use]
    pub const fn is_framing_error(&self) -> bool {
        matches!(self, Self::Framing(_))
    }
}

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::malformed("write assigned twice for 'Person'");
        assert_eq!(err.to_string(), "malformed protocol: write assigned twice for 'Person'");

        let err = Error::type_mismatch("INT", "STRING");
        assert_eq!(err.to_string(), "type mismatch: expected INT, got STRING");
    }

    #[test]
    fn test_error_predicates() {
        assert!(Error::malformed("x").is_protocol_error());
        assert!(!Error::framing("x").is_protocol_error());
        assert!(Error::framing("x").is_framing_error());
        assert!(!Error::missing_op("x").is_framing_error());
    }
}
