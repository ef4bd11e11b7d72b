//! Byte stream seams and the primitive codec.
//!
//! The engine talks to the outside world through two narrow traits:
//!
//! - [`ByteSink`] - where encoded bytes go
//! - [`ByteSource`] - where encoded bytes come from
//!
//! Both are blanket-implemented for the standard `std::io` traits, so files,
//! sockets, `Vec<u8>` and `Cursor` all work without adapters. Streams are
//! owned by the caller; the engine closes them on explicit request only.
//!
//! All integers on the wire are big-endian, two's complement. Floats are
//! IEEE-754 binary32/binary64. Strings are a 32-bit byte-length prefix
//! followed by UTF-8 bytes.

use std::io;

use crate::error::{Error, Result};

/// A destination for encoded bytes.
///
/// Implemented for every [`std::io::Write`] type. `close` defaults to a
/// flush; sinks with a real close-side effect can override it.
pub trait ByteSink {
    /// Write the whole buffer.
    ///
    /// # Errors
    ///
    /// Returns any error surfaced by the underlying stream.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Flush buffered bytes through to the underlying stream.
    ///
    /// # Errors
    ///
    /// Returns any error surfaced by the underlying stream.
    fn flush(&mut self) -> io::Result<()>;

    /// Release the stream. Called by the engine on explicit request only.
    ///
    /// # Errors
    ///
    /// Returns any error surfaced by the underlying stream.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl<W: io::Write> ByteSink for W {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(self)
    }
}

/// A source of encoded bytes.
///
/// Implemented for every [`std::io::Read`] type.
pub trait ByteSource {
    /// Fill the whole buffer.
    ///
    /// # Errors
    ///
    /// Returns any error surfaced by the underlying stream, including
    /// [`std::io::ErrorKind::UnexpectedEof`] when the stream is exhausted.
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Release the stream. Called by the engine on explicit request only.
    ///
    /// # Errors
    ///
    /// Returns any error surfaced by the underlying stream.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<R: io::Read> ByteSource for R {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        io::Read::read_exact(self, buf)
    }
}

/// Maps a raw read error: end-of-stream mid-value is a framing violation,
/// everything else surfaces as IO.
pub(crate) fn map_read_err(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::framing("stream ended mid-value")
    } else {
        Error::Io(err)
    }
}

/// Encodes a length as the wire's 32-bit signed count.
pub(crate) fn wire_len(len: usize, what: &str) -> Result<i32> {
    i32::try_from(len).map_err(|_| Error::framing(format!("{what} length exceeds i32::MAX")))
}

/// Decodes the wire's 32-bit signed count into a usable length.
pub(crate) fn usable_len(len: i32, what: &str) -> Result<usize> {
    usize::try_from(len).map_err(|_| Error::framing(format!("negative {what} length {len}")))
}

/// Encodes a `char` as a single UTF-16 code unit.
///
/// Scalars outside the Basic Multilingual Plane would need a surrogate pair
/// and are rejected instead of being split.
pub(crate) fn char_to_unit(c: char) -> Result<u16> {
    u16::try_from(u32::from(c))
        .map_err(|_| Error::type_mismatch("CHAR in the Basic Multilingual Plane", format!("{c:?}")))
}

/// Decodes a UTF-16 code unit back into a `char`.
///
/// Unpaired surrogates cannot come from [`char_to_unit`] and are a framing
/// violation.
pub(crate) fn unit_to_char(unit: u16) -> Result<char> {
    char::from_u32(u32::from(unit))
        .ok_or_else(|| Error::framing(format!("surrogate code unit {unit:#06x} in CHAR")))
}

/// A packed array element: knows how to move itself over the wire with no
/// per-element tag.
pub(crate) trait Scalar: Copy {
    fn write_to(self, ser: &mut crate::ser::Serializer<'_>) -> Result<()>;
    fn read_from(de: &mut crate::de::Deserializer<'_>) -> Result<Self>;
}

impl Scalar for bool {
    fn write_to(self, ser: &mut crate::ser::Serializer<'_>) -> Result<()> {
        ser.emit_bytes(&[u8::from(self)])
    }

    fn read_from(de: &mut crate::de::Deserializer<'_>) -> Result<Self> {
        de.take_bool()
    }
}

impl Scalar for char {
    fn write_to(self, ser: &mut crate::ser::Serializer<'_>) -> Result<()> {
        ser.emit_bytes(&char_to_unit(self)?.to_be_bytes())
    }

    fn read_from(de: &mut crate::de::Deserializer<'_>) -> Result<Self> {
        de.take_char()
    }
}

macro_rules! numeric_scalar {
    ($($ty:ty => $take:ident),* $(,)?) => {
        $(
            impl Scalar for $ty {
                fn write_to(self, ser: &mut crate::ser::Serializer<'_>) -> Result<()> {
                    ser.emit_bytes(&self.to_be_bytes())
                }

                fn read_from(de: &mut crate::de::Deserializer<'_>) -> Result<Self> {
                    de.$take()
                }
            }
        )*
    };
}

numeric_scalar! {
    i8 => take_i8,
    i16 => take_i16,
    i32 => take_i32,
    i64 => take_i64,
    f32 => take_f32,
    f64 => take_f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_is_blanket_implemented_for_write() {
        let mut buf: Vec<u8> = Vec::new();
        let sink: &mut dyn ByteSink = &mut buf;
        sink.write_all(&[1, 2, 3]).expect("write to vec");
        sink.flush().expect("flush vec");
        assert_eq!(buf, vec![1, 2, 3]);
    }

    #[test]
    fn source_maps_eof_to_framing() {
        let mut cursor = std::io::Cursor::new(vec![1u8]);
        let source: &mut dyn ByteSource = &mut cursor;
        let mut two = [0u8; 2];
        let err = source.read_exact(&mut two).expect_err("eof");
        assert!(map_read_err(err).is_framing_error());
    }

    #[test]
    fn char_units() {
        assert_eq!(char_to_unit('X').expect("bmp"), 0x0058);
        assert_eq!(unit_to_char(0x0058).expect("bmp"), 'X');
        assert!(char_to_unit('\u{1F600}').is_err());
        assert!(unit_to_char(0xD800).is_err());
    }

    #[test]
    fn wire_lengths() {
        assert_eq!(wire_len(0, "list").expect("fits"), 0);
        assert_eq!(usable_len(7, "list").expect("fits"), 7);
        assert!(usable_len(-1, "list").is_err());
    }
}
