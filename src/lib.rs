//! Defines a compact, self-describing binary serialization format that can be
//! produced and consumed across language boundaries.
//!
//! A [`Codec`] encodes dynamic [`Value`] graphs into a framed little-endian
//! byte stream and decodes them back, preserving reference identity: objects
//! that share storage before encoding share storage after decoding, including
//! graphs that contain cycles. Type identity crosses the language boundary
//! either as a small built-in type id or as a namespaced name compressed with
//! the meta-string codec.

pub mod buffer;
pub mod codec;
pub mod error;
pub mod hash;
pub mod meta;
pub mod pool;
pub mod resolver;
pub mod schema;
pub mod serializer;
pub mod value;

pub use buffer::Buffer;
pub use codec::{BufferCallback, BufferObject, Codec, CodecBuilder, Language};
pub use error::{Error, Result};
pub use pool::CodecPool;
pub use schema::{Field, Schema, StructSchema, TypeKey};
pub use value::{MapValue, StructValue, Value};

#[cfg(test)]
mod roundtrip_test;
