//! String payload codec.
//!
//! A string opens with `var_uint64((length_units << 2) | encoding)` and is
//! stored in the narrowest of three encodings:
//!
//! - `LATIN1` (0) when every code point fits one byte; length in bytes.
//! - `UTF16_LE` (1) when every code point is in the basic plane; length in
//!   UTF-16 code units.
//! - `UTF8` (2) otherwise; length in bytes.

use std::rc::Rc;

use crate::buffer::Buffer;
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::resolver::types::{TypeId, STRING};
use crate::value::Value;

use super::Serializer;

const LATIN1: u64 = 0;
const UTF16_LE: u64 = 1;
const UTF8: u64 = 2;

/// Writes the payload of `s`.
pub fn write_str(buf: &mut Buffer, s: &str) {
    if s.chars().all(|c| (c as u32) <= 0xFF) {
        let units = s.chars().count() as u64;
        buf.write_var_uint64((units << 2) | LATIN1);
        for c in s.chars() {
            buf.write_u8(c as u8);
        }
    } else if s.chars().all(|c| (c as u32) <= 0xFFFF) {
        let units: Vec<u16> = s.encode_utf16().collect();
        buf.write_var_uint64(((units.len() as u64) << 2) | UTF16_LE);
        for unit in units {
            buf.write_binary(&unit.to_le_bytes());
        }
    } else {
        buf.write_var_uint64(((s.len() as u64) << 2) | UTF8);
        buf.write_binary(s.as_bytes());
    }
}

/// Reads one string payload.
pub fn read_str(buf: &mut Buffer) -> Result<String> {
    let header = buf.read_var_uint64()?;
    let units = (header >> 2) as usize;
    match header & 3 {
        LATIN1 => {
            let bytes = buf.read_binary(units)?;
            Ok(bytes.into_iter().map(char::from).collect())
        }
        UTF16_LE => {
            let bytes = buf.read_binary(units * 2)?;
            let code_units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&code_units)
                .map_err(|_| Error::Malformed("string is not valid UTF-16"))
        }
        UTF8 => {
            let bytes = buf.read_binary(units)?;
            String::from_utf8(bytes)
                .map_err(|_| Error::Malformed("string is not valid UTF-8"))
        }
        tag => Err(Error::UnknownEncoding(tag as u8)),
    }
}

#[derive(Debug, Default)]
pub struct StringSerializer;

impl Serializer for StringSerializer {
    fn type_id(&self) -> TypeId { STRING }

    fn write(
        &self,
        _codec: &mut Codec,
        buf: &mut Buffer,
        value: &Value,
    ) -> Result<()> {
        let Value::String(s) = value else {
            return Err(Error::mismatch("string", value));
        };
        write_str(buf, s);
        Ok(())
    }

    fn read(&self, _codec: &mut Codec, buf: &mut Buffer) -> Result<Value> {
        Ok(Value::String(Rc::new(read_str(buf)?)))
    }
}
