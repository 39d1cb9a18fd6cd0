//! Built-in payload codecs and the trait that dispatches them.
//!
//! A [`Serializer`] owns the payload format of one wire type; the
//! surrounding null/reference tag and the type tag are the caller's
//! concern. Dynamic slots resolve their serializer through the type
//! resolver per value; slots with a declared [`Schema`] skip the type tag
//! and route straight to the payload codec via [`write_field`] and
//! [`read_field`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::resolver::reference::NOT_NULL_VALUE_TAG;
use crate::resolver::types::TypeId;
use crate::schema::Schema;
use crate::value::{MapValue, Value};

pub mod array;
pub mod collection;
pub mod map;
pub mod primitive;
pub mod string;
pub mod structure;

/// Payload codec for one wire type.
pub trait Serializer {
    /// The wire type id this codec writes under.
    fn type_id(&self) -> TypeId;

    /// Writes the payload of `value`. The reference tag and type tag, if
    /// any, have already been written.
    fn write(
        &self,
        codec: &mut Codec,
        buf: &mut Buffer,
        value: &Value,
    ) -> Result<()>;

    /// Reads one payload.
    fn read(&self, codec: &mut Codec, buf: &mut Buffer) -> Result<Value>;
}

/// Writes a slot with a declared schema: the null/reference protocol for
/// referencable shapes, a bare not-null tag for primitives, the full
/// dynamic protocol for [`Schema::Dynamic`]. No type tag is emitted except
/// inside dynamic slots.
pub fn write_field(
    codec: &mut Codec,
    buf: &mut Buffer,
    schema: &Schema,
    value: &Value,
) -> Result<()> {
    match schema {
        Schema::Dynamic => codec.write_referencable(buf, value),
        s if !s.referencable() => {
            buf.write_i8(NOT_NULL_VALUE_TAG);
            write_primitive_payload(buf, s, value)
        }
        s => {
            let fully_written =
                codec.ref_resolver.write_ref_or_null(buf, value)?;
            if !fully_written {
                write_declared_payload(codec, buf, s, value)?;
            }
            Ok(())
        }
    }
}

/// Reads a slot written by [`write_field`].
pub fn read_field(
    codec: &mut Codec,
    buf: &mut Buffer,
    schema: &Schema,
) -> Result<Value> {
    match schema {
        Schema::Dynamic => codec.read_referencable(buf),
        s if !s.referencable() => {
            let tag = buf.read_i8()?;
            if tag != NOT_NULL_VALUE_TAG {
                return Err(Error::UnexpectedRefTag(tag));
            }
            read_primitive_payload(buf, s)
        }
        s => {
            let ref_id = codec.ref_resolver.try_preserve_ref_id(buf)?;
            if ref_id < i32::from(NOT_NULL_VALUE_TAG) {
                return Ok(codec.ref_resolver.current_read_object());
            }
            let value = read_declared_payload(codec, buf, s)?;
            codec.ref_resolver.set_read_object(ref_id, value.clone());
            Ok(value)
        }
    }
}

fn write_primitive_payload(
    buf: &mut Buffer,
    schema: &Schema,
    value: &Value,
) -> Result<()> {
    match (schema, value) {
        (Schema::Bool, Value::Bool(v)) => buf.write_bool(*v),
        (Schema::Int8, Value::Int8(v)) => buf.write_i8(*v),
        (Schema::Int16, Value::Int16(v)) => buf.write_i16(*v),
        (Schema::Int32, Value::Int32(v)) => {
            buf.write_var_int32(*v);
        }
        (Schema::Int64, Value::Int64(v)) => {
            buf.write_var_int64(*v);
        }
        (Schema::Float32, Value::Float32(v)) => buf.write_f32(*v),
        (Schema::Float64, Value::Float64(v)) => buf.write_f64(*v),
        (Schema::Date, Value::Date(days)) => buf.write_i32(*days),
        (Schema::Timestamp, Value::Timestamp(micros)) => {
            buf.write_i64(*micros);
        }
        (schema, value) => {
            return Err(Error::mismatch(schema_slot_name(schema), value))
        }
    }
    Ok(())
}

fn read_primitive_payload(buf: &mut Buffer, schema: &Schema) -> Result<Value> {
    Ok(match schema {
        Schema::Bool => Value::Bool(buf.read_bool()?),
        Schema::Int8 => Value::Int8(buf.read_i8()?),
        Schema::Int16 => Value::Int16(buf.read_i16()?),
        Schema::Int32 => Value::Int32(buf.read_var_int32()?),
        Schema::Int64 => Value::Int64(buf.read_var_int64()?),
        Schema::Float32 => Value::Float32(buf.read_f32()?),
        Schema::Float64 => Value::Float64(buf.read_f64()?),
        Schema::Date => Value::Date(buf.read_i32()?),
        Schema::Timestamp => Value::Timestamp(buf.read_i64()?),
        _ => return Err(Error::Malformed("schema is not a primitive")),
    })
}

fn write_declared_payload(
    codec: &mut Codec,
    buf: &mut Buffer,
    schema: &Schema,
    value: &Value,
) -> Result<()> {
    match schema {
        Schema::String => {
            let Value::String(s) = value else {
                return Err(Error::mismatch("string", value));
            };
            string::write_str(buf, s);
            Ok(())
        }
        Schema::Binary => {
            let Value::Binary(data) = value else {
                return Err(Error::mismatch("binary", value));
            };
            codec.write_buffer_object(buf, data)
        }
        Schema::BoolArray
        | Schema::Int8Array
        | Schema::Int16Array
        | Schema::Int32Array
        | Schema::Int64Array
        | Schema::Float32Array
        | Schema::Float64Array => array::write_array_payload(buf, value),
        Schema::List(inner) => {
            let Value::List(elements) = value else {
                return Err(Error::mismatch("list", value));
            };
            let elements = elements.borrow();
            buf.write_length(elements.len())?;
            for element in elements.iter() {
                write_field(codec, buf, inner, element)?;
            }
            Ok(())
        }
        Schema::Set(inner) => {
            let Value::Set(elements) = value else {
                return Err(Error::mismatch("set", value));
            };
            let elements = elements.borrow();
            buf.write_length(elements.len())?;
            for element in elements.iter() {
                write_field(codec, buf, inner, element)?;
            }
            Ok(())
        }
        Schema::Map(key_schema, value_schema) => {
            let Value::Map(map) = value else {
                return Err(Error::mismatch("map", value));
            };
            let map = map.borrow();
            buf.write_length(map.len())?;
            for (k, v) in map.iter() {
                write_field(codec, buf, key_schema, k)?;
                write_field(codec, buf, value_schema, v)?;
            }
            Ok(())
        }
        Schema::Named(path) => {
            let info = codec.type_resolver.info_by_path(path)?;
            info.serializer().clone().write(codec, buf, value)
        }
        _ => Err(Error::Malformed("schema has no declared payload form")),
    }
}

fn read_declared_payload(
    codec: &mut Codec,
    buf: &mut Buffer,
    schema: &Schema,
) -> Result<Value> {
    match schema {
        Schema::String => {
            Ok(Value::String(Rc::new(string::read_str(buf)?)))
        }
        Schema::Binary => {
            let data = codec.read_buffer_object(buf)?;
            Ok(Value::Binary(Rc::new(data.written().to_vec())))
        }
        Schema::BoolArray
        | Schema::Int8Array
        | Schema::Int16Array
        | Schema::Int32Array
        | Schema::Int64Array
        | Schema::Float32Array
        | Schema::Float64Array => array::read_array_payload(buf, schema),
        Schema::List(inner) => {
            let n = buf.read_length()?;
            let elements = Rc::new(RefCell::new(Vec::with_capacity(n)));
            let value = Value::List(elements.clone());
            codec.ref_resolver.reference(value.clone());
            for _ in 0..n {
                let element = read_field(codec, buf, inner)?;
                elements.borrow_mut().push(element);
            }
            Ok(value)
        }
        Schema::Set(inner) => {
            let n = buf.read_length()?;
            let elements = Rc::new(RefCell::new(Vec::with_capacity(n)));
            let value = Value::Set(elements.clone());
            codec.ref_resolver.reference(value.clone());
            for _ in 0..n {
                let element = read_field(codec, buf, inner)?;
                elements.borrow_mut().push(element);
            }
            Ok(value)
        }
        Schema::Map(key_schema, value_schema) => {
            let n = buf.read_length()?;
            let map = Rc::new(RefCell::new(MapValue::new()));
            let value = Value::Map(map.clone());
            codec.ref_resolver.reference(value.clone());
            for _ in 0..n {
                let k = read_field(codec, buf, key_schema)?;
                let v = read_field(codec, buf, value_schema)?;
                map.borrow_mut().insert(k, v);
            }
            Ok(value)
        }
        Schema::Named(path) => {
            let info = codec.type_resolver.info_by_path(path)?;
            info.serializer().clone().read(codec, buf)
        }
        _ => Err(Error::Malformed("schema has no declared payload form")),
    }
}

fn schema_slot_name(schema: &Schema) -> &'static str {
    match schema {
        Schema::Bool => "bool",
        Schema::Int8 => "int8",
        Schema::Int16 => "int16",
        Schema::Int32 => "int32",
        Schema::Int64 => "int64",
        Schema::Float32 => "float32",
        Schema::Float64 => "float64",
        Schema::Date => "date",
        Schema::Timestamp => "timestamp",
        _ => "value",
    }
}
