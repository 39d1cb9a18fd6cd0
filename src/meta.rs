//! Compressed representation of ASCII identifiers.
//!
//! Namespaces and type names repeat heavily across a stream and are almost
//! always drawn from a tiny alphabet, so they are packed into 5- or 6-bit
//! code units instead of full bytes. Five encodings cover the common shapes
//! of identifiers; anything unrepresentable falls back to raw UTF-8.

use crate::error::{Error, Result};

pub mod decoder;
pub mod encoder;

pub use decoder::MetaStringDecoder;
pub use encoder::MetaStringEncoder;

/// Maximum number of input chars a meta string may carry.
pub const MAX_META_STRING_LEN: usize = 32_767;

/// How the characters of a [`MetaString`] are packed on the wire.
///
/// Every encoding except [`Encoding::Utf8`] requires pure-ASCII input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Encoding {
    /// Raw UTF-8 bytes, 8 bits per char.
    Utf8 = 0x00,
    /// `a-z` plus `. _ $ |`, 5 bits per char.
    LowerSpecial = 0x01,
    /// `a-z A-Z 0-9` plus two configurable special chars, 6 bits per char.
    LowerUpperDigitSpecial = 0x02,
    /// [`Encoding::LowerSpecial`] after lowering the single leading
    /// uppercase letter.
    FirstToLowerSpecial = 0x03,
    /// [`Encoding::LowerSpecial`] with every uppercase letter escaped as
    /// `|x`.
    AllToLowerSpecial = 0x04,
}

impl TryFrom<u8> for Encoding {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Utf8),
            0x01 => Ok(Self::LowerSpecial),
            0x02 => Ok(Self::LowerUpperDigitSpecial),
            0x03 => Ok(Self::FirstToLowerSpecial),
            0x04 => Ok(Self::AllToLowerSpecial),
            other => Err(Error::UnknownEncoding(other)),
        }
    }
}

/// An identifier together with its chosen packing.
///
/// Produced by [`MetaStringEncoder::encode`]; the encoded bytes carry a
/// leading flag bit (bit 7 of byte 0) marking whether the final code unit
/// was stripped because the last group did not fill `bits_per_char` bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaString {
    original: String,
    encoding: Encoding,
    special_char1: char,
    special_char2: char,
    encoded: Vec<u8>,
}

impl MetaString {
    pub(crate) fn new(
        original: String,
        encoding: Encoding,
        special_char1: char,
        special_char2: char,
        encoded: Vec<u8>,
    ) -> Self {
        Self { original, encoding, special_char1, special_char2, encoded }
    }

    /// The identifier this meta string was built from.
    #[must_use]
    pub fn original(&self) -> &str { &self.original }

    /// The packing selected by the encoder.
    #[must_use]
    pub fn encoding(&self) -> Encoding { self.encoding }

    /// The packed wire bytes.
    #[must_use]
    pub fn encoded(&self) -> &[u8] { &self.encoded }
}

#[cfg(test)]
mod test;
