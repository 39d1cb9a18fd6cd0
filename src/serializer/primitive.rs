//! Payload codecs for the fixed-width and varint scalar kinds.
//!
//! `i16` is fixed little-endian; `i32` and `i64` are zig-zag varints, which
//! is the profitable choice for the dynamic slots these codecs serve.
//! Dates travel as a day count since the epoch day, timestamps as
//! microseconds since the Unix epoch, both fixed-width.

use crate::buffer::Buffer;
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::resolver::types::{
    self, TypeId, BOOL, FLOAT32, FLOAT64, INT16, INT32, INT64, INT8,
};
use crate::value::Value;

use super::Serializer;

macro_rules! scalar_serializer {
    (
        $(#[$doc:meta])*
        $name:ident, $type_id:expr, $variant:ident,
        write($buf_w:ident, $v:ident) $write:block,
        read($buf_r:ident) $read:block
    ) => {
        $(#[$doc])*
        #[derive(Debug, Default)]
        pub struct $name;

        impl Serializer for $name {
            fn type_id(&self) -> TypeId { $type_id }

            fn write(
                &self,
                _codec: &mut Codec,
                $buf_w: &mut Buffer,
                value: &Value,
            ) -> Result<()> {
                let Value::$variant($v) = value else {
                    return Err(Error::mismatch(stringify!($variant), value));
                };
                $write
                Ok(())
            }

            fn read(
                &self,
                _codec: &mut Codec,
                $buf_r: &mut Buffer,
            ) -> Result<Value> {
                Ok(Value::$variant($read))
            }
        }
    };
}

scalar_serializer!(
    BoolSerializer, BOOL, Bool,
    write(buf, v) { buf.write_bool(*v); },
    read(buf) { buf.read_bool()? }
);

scalar_serializer!(
    Int8Serializer, INT8, Int8,
    write(buf, v) { buf.write_i8(*v); },
    read(buf) { buf.read_i8()? }
);

scalar_serializer!(
    Int16Serializer, INT16, Int16,
    write(buf, v) { buf.write_i16(*v); },
    read(buf) { buf.read_i16()? }
);

scalar_serializer!(
    /// Zig-zag varint payload.
    Int32Serializer, INT32, Int32,
    write(buf, v) { buf.write_var_int32(*v); },
    read(buf) { buf.read_var_int32()? }
);

scalar_serializer!(
    /// Zig-zag varint payload.
    Int64Serializer, INT64, Int64,
    write(buf, v) { buf.write_var_int64(*v); },
    read(buf) { buf.read_var_int64()? }
);

scalar_serializer!(
    Float32Serializer, FLOAT32, Float32,
    write(buf, v) { buf.write_f32(*v); },
    read(buf) { buf.read_f32()? }
);

scalar_serializer!(
    Float64Serializer, FLOAT64, Float64,
    write(buf, v) { buf.write_f64(*v); },
    read(buf) { buf.read_f64()? }
);

scalar_serializer!(
    /// Days since 1970-01-01, fixed `i32`.
    DateSerializer, types::LOCAL_DATE, Date,
    write(buf, v) { buf.write_i32(*v); },
    read(buf) { buf.read_i32()? }
);

scalar_serializer!(
    /// Microseconds since the Unix epoch, fixed `i64`.
    TimestampSerializer, types::TIMESTAMP, Timestamp,
    write(buf, v) { buf.write_i64(*v); },
    read(buf) { buf.read_i64()? }
);
