//! Failure kinds surfaced by encode and decode operations.
//!
//! Every protocol violation is fatal for the whole call: no error is
//! swallowed internally and no partial value escapes. The writer may have
//! produced bytes into the buffer before failing; callers discard them.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error raised while encoding or decoding a stream.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error(
        "buffer underflow: needed {needed} bytes at reader index {at}, only \
         {available} available"
    )]
    BufferUnderflow { at: usize, needed: usize, available: usize },

    #[error("length {0} exceeds the 2^31 - 1 wire limit")]
    BufferOverflow(u64),

    #[error(
        "stream must start with magic number 0x62d4, found 0x{found:04x}; \
         the bytes are not a weft stream or the data is corrupted"
    )]
    BadMagic { found: u16 },

    #[error("peer produced a big-endian stream, which is not supported")]
    BigEndianPeer,

    #[error("varint continuation bits exceed the {max_bytes}-byte maximum")]
    VarintOverflow { max_bytes: usize },

    #[error("meta string of {0} chars exceeds the 32767 limit")]
    MetaStringTooLong(usize),

    #[error("non-ASCII characters are not allowed in a packed meta string")]
    MetaStringNonAscii,

    #[error("type `{0}` has no local binding")]
    TypeUnregistered(String),

    #[error("type `{0}` is already registered")]
    TypeAlreadyRegistered(String),

    #[error("string header carries invalid encoding tag {0}")]
    UnknownEncoding(u8),

    #[error("more than 2^31 - 1 objects tracked in one stream")]
    RefCountOverflow,

    #[error("map chunk declared size 0")]
    ChunkSizeZero,

    #[error(
        "schema fingerprint {found} does not match the expected {expected} \
         for type `{type_name}`"
    )]
    HashMismatch { type_name: String, expected: i32, found: i32 },

    #[error("{0}")]
    MissingOutOfBand(&'static str),

    #[error("a {found} value does not fit a slot declared as {expected}")]
    SchemaMismatch { expected: &'static str, found: &'static str },

    #[error("back-reference {0} does not resolve to a deserialized object")]
    BadBackReference(u32),

    #[error("dynamic string id {0} was never defined in this stream")]
    InvalidDynamicId(u32),

    #[error("unexpected reference tag {0}")]
    UnexpectedRefTag(i8),

    #[error("serialization in {0:?} mode is not supported")]
    UnsupportedLanguage(crate::codec::Language),

    #[error("malformed stream: {0}")]
    Malformed(&'static str),
}

impl Error {
    /// Shorthand for a [`Error::SchemaMismatch`] built from the slot name and
    /// the offending value.
    pub(crate) fn mismatch(expected: &'static str, found: &crate::Value) -> Self {
        Self::SchemaMismatch { expected, found: found.kind_name() }
    }
}
