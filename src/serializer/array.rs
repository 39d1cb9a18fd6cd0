//! Typed primitive array codecs and the binary (byte payload) codec.
//!
//! A typed array writes its byte length, then the raw little-endian
//! elements. Byte payloads go through the buffer-object hook instead, so an
//! out-of-band policy can lift them out of the stream.

use std::rc::Rc;

use crate::buffer::Buffer;
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::resolver::types::{
    TypeId, BINARY, BOOL_ARRAY, FLOAT32_ARRAY, FLOAT64_ARRAY, INT16_ARRAY,
    INT32_ARRAY, INT64_ARRAY, INT8_ARRAY,
};
use crate::schema::Schema;
use crate::value::Value;

use super::Serializer;

/// Writes the payload of any typed-array value.
pub fn write_array_payload(buf: &mut Buffer, value: &Value) -> Result<()> {
    match value {
        Value::BoolArray(v) => {
            buf.write_length(v.len())?;
            for &b in v.iter() {
                buf.write_bool(b);
            }
        }
        Value::Int8Array(v) => {
            buf.write_length(v.len())?;
            for &x in v.iter() {
                buf.write_i8(x);
            }
        }
        Value::Int16Array(v) => {
            buf.write_length(v.len() * 2)?;
            for &x in v.iter() {
                buf.write_i16(x);
            }
        }
        Value::Int32Array(v) => {
            buf.write_length(v.len() * 4)?;
            for &x in v.iter() {
                buf.write_i32(x);
            }
        }
        Value::Int64Array(v) => {
            buf.write_length(v.len() * 8)?;
            for &x in v.iter() {
                buf.write_i64(x);
            }
        }
        Value::Float32Array(v) => {
            buf.write_length(v.len() * 4)?;
            for &x in v.iter() {
                buf.write_f32(x);
            }
        }
        Value::Float64Array(v) => {
            buf.write_length(v.len() * 8)?;
            for &x in v.iter() {
                buf.write_f64(x);
            }
        }
        other => return Err(Error::mismatch("typed array", other)),
    }
    Ok(())
}

/// Reads the payload of the typed array `schema` describes.
pub fn read_array_payload(buf: &mut Buffer, schema: &Schema) -> Result<Value> {
    let byte_len = buf.read_length()?;
    Ok(match schema {
        Schema::BoolArray => {
            let mut out = Vec::with_capacity(byte_len);
            for _ in 0..byte_len {
                out.push(buf.read_bool()?);
            }
            Value::BoolArray(Rc::new(out))
        }
        Schema::Int8Array => {
            let mut out = Vec::with_capacity(byte_len);
            for _ in 0..byte_len {
                out.push(buf.read_i8()?);
            }
            Value::Int8Array(Rc::new(out))
        }
        Schema::Int16Array => {
            let mut out = Vec::with_capacity(byte_len / 2);
            for _ in 0..byte_len / 2 {
                out.push(buf.read_i16()?);
            }
            Value::Int16Array(Rc::new(out))
        }
        Schema::Int32Array => {
            let mut out = Vec::with_capacity(byte_len / 4);
            for _ in 0..byte_len / 4 {
                out.push(buf.read_i32()?);
            }
            Value::Int32Array(Rc::new(out))
        }
        Schema::Int64Array => {
            let mut out = Vec::with_capacity(byte_len / 8);
            for _ in 0..byte_len / 8 {
                out.push(buf.read_i64()?);
            }
            Value::Int64Array(Rc::new(out))
        }
        Schema::Float32Array => {
            let mut out = Vec::with_capacity(byte_len / 4);
            for _ in 0..byte_len / 4 {
                out.push(buf.read_f32()?);
            }
            Value::Float32Array(Rc::new(out))
        }
        Schema::Float64Array => {
            let mut out = Vec::with_capacity(byte_len / 8);
            for _ in 0..byte_len / 8 {
                out.push(buf.read_f64()?);
            }
            Value::Float64Array(Rc::new(out))
        }
        _ => return Err(Error::Malformed("schema is not a typed array")),
    })
}

macro_rules! array_serializer {
    ($name:ident, $type_id:expr, $schema:expr, $variant:ident) => {
        #[derive(Debug, Default)]
        pub struct $name;

        impl Serializer for $name {
            fn type_id(&self) -> TypeId { $type_id }

            fn write(
                &self,
                _codec: &mut Codec,
                buf: &mut Buffer,
                value: &Value,
            ) -> Result<()> {
                if !matches!(value, Value::$variant(_)) {
                    return Err(Error::mismatch("typed array", value));
                }
                write_array_payload(buf, value)
            }

            fn read(
                &self,
                _codec: &mut Codec,
                buf: &mut Buffer,
            ) -> Result<Value> {
                read_array_payload(buf, &$schema)
            }
        }
    };
}

array_serializer!(BoolArraySerializer, BOOL_ARRAY, Schema::BoolArray, BoolArray);
array_serializer!(Int8ArraySerializer, INT8_ARRAY, Schema::Int8Array, Int8Array);
array_serializer!(
    Int16ArraySerializer,
    INT16_ARRAY,
    Schema::Int16Array,
    Int16Array
);
array_serializer!(
    Int32ArraySerializer,
    INT32_ARRAY,
    Schema::Int32Array,
    Int32Array
);
array_serializer!(
    Int64ArraySerializer,
    INT64_ARRAY,
    Schema::Int64Array,
    Int64Array
);
array_serializer!(
    Float32ArraySerializer,
    FLOAT32_ARRAY,
    Schema::Float32Array,
    Float32Array
);
array_serializer!(
    Float64ArraySerializer,
    FLOAT64_ARRAY,
    Schema::Float64Array,
    Float64Array
);

/// Byte payloads, routed through the out-of-band hook: in-band writes
/// `true`, a length and the bytes; out-of-band writes `false` and hands the
/// payload to the configured callback.
#[derive(Debug, Default)]
pub struct BinarySerializer;

impl Serializer for BinarySerializer {
    fn type_id(&self) -> TypeId { BINARY }

    fn write(
        &self,
        codec: &mut Codec,
        buf: &mut Buffer,
        value: &Value,
    ) -> Result<()> {
        let Value::Binary(data) = value else {
            return Err(Error::mismatch("binary", value));
        };
        codec.write_buffer_object(buf, data)
    }

    fn read(&self, codec: &mut Codec, buf: &mut Buffer) -> Result<Value> {
        let data = codec.read_buffer_object(buf)?;
        Ok(Value::Binary(Rc::new(data.written().to_vec())))
    }
}
