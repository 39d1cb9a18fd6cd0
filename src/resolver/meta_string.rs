//! Per-stream interning of meta-strings.
//!
//! The first occurrence of a namespace or type name is written in full and
//! assigned a small dynamic id; later occurrences write the id instead. The
//! on-wire header is `(length << 1) | is_back_reference`. Full payloads for
//! strings of at most [`SMALL_STRING_THRESHOLD`] bytes carry one encoding
//! byte; longer ones carry the 64-bit hash, whose low byte is the encoding.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::hash::murmur3_x64_128;
use crate::meta::{Encoding, MetaString};

/// Payloads up to this many bytes inline their encoding instead of a hash.
pub const SMALL_STRING_THRESHOLD: usize = 8;

const UNASSIGNED_DYNAMIC_ID: i32 = -1;

/// An interned meta-string payload.
///
/// The hash contract keys the whole resolver: payloads of at most 8 bytes
/// hash as their little-endian value times 31; payloads of 9 to 16 bytes
/// mix their two 64-bit halves as `v1 * 31 + v2`; longer payloads take the
/// first 64 bits of Murmur3-128. In every case the low byte is replaced by
/// the encoding, so a decoder recovers the encoding from the hash alone.
#[derive(Debug)]
pub struct MetaStringBytes {
    data: Vec<u8>,
    encoding: Encoding,
    hashcode: i64,
    dynamic_write_id: Cell<i32>,
}

impl MetaStringBytes {
    /// Builds a handle from an encoded meta-string, computing its hash.
    #[must_use]
    pub fn from_meta_string(m: &MetaString) -> Self {
        let data = m.encoded().to_vec();
        let hashcode = hash_payload(&data, m.encoding());
        Self {
            data,
            encoding: m.encoding(),
            hashcode,
            dynamic_write_id: Cell::new(UNASSIGNED_DYNAMIC_ID),
        }
    }

    fn from_wire(data: Vec<u8>, encoding: Encoding, hashcode: i64) -> Self {
        Self {
            data,
            encoding,
            hashcode,
            dynamic_write_id: Cell::new(UNASSIGNED_DYNAMIC_ID),
        }
    }

    #[must_use]
    pub fn data(&self) -> &[u8] { &self.data }

    #[must_use]
    pub fn encoding(&self) -> Encoding { self.encoding }

    #[must_use]
    pub fn hashcode(&self) -> i64 { self.hashcode }
}

fn hash_payload(data: &[u8], encoding: Encoding) -> i64 {
    let mixed = if data.len() <= 16 {
        let (v1, v2) = split_halves(data);
        v1.wrapping_mul(31).wrapping_add(v2)
    } else {
        let (h1, _) = murmur3_x64_128(data, 0);
        h1 as i64
    };
    ((mixed >> 8) << 8) | i64::from(encoding as u8)
}

/// The two little-endian halves of a payload of at most 16 bytes.
fn split_halves(data: &[u8]) -> (i64, i64) {
    (bytes_to_i64(&data[..data.len().min(8)]), bytes_to_i64(data.get(8..).unwrap_or(&[])))
}

fn bytes_to_i64(bytes: &[u8]) -> i64 {
    let mut out = 0i64;
    for (i, &b) in bytes.iter().enumerate() {
        out |= i64::from(b) << (8 * i);
    }
    out
}

/// Interns meta-strings within one stream and resolves their dynamic ids.
#[derive(Debug, Default)]
pub struct MetaStringResolver {
    dynamic_write_id: i32,
    written: Vec<Rc<MetaStringBytes>>,
    dynamic_id_to_bytes: Vec<Rc<MetaStringBytes>>,
    small_to_bytes: HashMap<(i64, i64), Rc<MetaStringBytes>>,
    hash_to_bytes: HashMap<i64, Rc<MetaStringBytes>>,
    converted: HashMap<(u8, Vec<u8>), Rc<MetaStringBytes>>,
}

impl MetaStringResolver {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Converts an encoded meta-string to its interned handle, reusing a
    /// previous conversion when the payload was seen before.
    pub fn get_meta_string_bytes(
        &mut self,
        m: &MetaString,
    ) -> Rc<MetaStringBytes> {
        let key = (m.encoding() as u8, m.encoded().to_vec());
        if let Some(existing) = self.converted.get(&key) {
            return existing.clone();
        }
        let bytes = Rc::new(MetaStringBytes::from_meta_string(m));
        self.converted.insert(key, bytes.clone());
        bytes
    }

    /// Writes `m`, in full on first occurrence and as a dynamic id after.
    pub fn write_meta_string_bytes(
        &mut self,
        buf: &mut Buffer,
        m: &Rc<MetaStringBytes>,
    ) {
        let id = m.dynamic_write_id.get();
        if id == UNASSIGNED_DYNAMIC_ID {
            m.dynamic_write_id.set(self.dynamic_write_id);
            self.dynamic_write_id += 1;
            self.written.push(m.clone());

            buf.write_var_uint32((m.data.len() as u32) << 1);
            if m.data.len() <= SMALL_STRING_THRESHOLD {
                buf.write_u8(m.encoding as u8);
            } else {
                buf.write_i64(m.hashcode);
            }
            buf.write_binary(&m.data);
        } else {
            buf.write_var_uint32((((id + 1) as u32) << 1) | 1);
        }
    }

    /// Reads a meta-string payload or back-reference, interning new
    /// payloads so repeated reads share one handle.
    pub fn read_meta_string_bytes(
        &mut self,
        buf: &mut Buffer,
    ) -> Result<Rc<MetaStringBytes>> {
        let header = buf.read_var_uint32()?;
        if header & 1 != 0 {
            let index = (header >> 1) as usize;
            return self
                .dynamic_id_to_bytes
                .get(index.wrapping_sub(1))
                .cloned()
                .ok_or(Error::InvalidDynamicId(header >> 1));
        }

        let length = (header >> 1) as usize;
        let bytes = if length <= SMALL_STRING_THRESHOLD {
            let encoding = Encoding::try_from(buf.read_u8()?)?;
            let data = buf.read_binary(length)?;
            // The length disambiguates payloads whose trailing bits are all
            // zero, such as packed "a" and "aaa".
            let key = (bytes_to_i64(&data), length as i64);
            match self.small_to_bytes.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let hashcode = hash_payload(&data, encoding);
                    let created = Rc::new(MetaStringBytes::from_wire(
                        data, encoding, hashcode,
                    ));
                    self.small_to_bytes.insert(key, created.clone());
                    created
                }
            }
        } else {
            let hashcode = buf.read_i64()?;
            let encoding = Encoding::try_from((hashcode & 0xFF) as u8)?;
            let data = buf.read_binary(length)?;
            match self.hash_to_bytes.get(&hashcode) {
                Some(existing) => existing.clone(),
                None => {
                    let created = Rc::new(MetaStringBytes::from_wire(
                        data, encoding, hashcode,
                    ));
                    self.hash_to_bytes.insert(hashcode, created.clone());
                    created
                }
            }
        };
        self.dynamic_id_to_bytes.push(bytes.clone());
        Ok(bytes)
    }

    /// Clears write-side dynamic ids. Interned handles survive, so the next
    /// stream re-announces each string once and then reuses its cache.
    pub fn reset_write(&mut self) {
        self.dynamic_write_id = 0;
        for m in self.written.drain(..) {
            m.dynamic_write_id.set(UNASSIGNED_DYNAMIC_ID);
        }
    }

    /// Clears read-side dynamic ids.
    pub fn reset_read(&mut self) {
        self.dynamic_id_to_bytes.clear();
    }
}

#[cfg(test)]
mod test;
