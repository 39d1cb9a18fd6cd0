//! Tracks objects already written or read, so shared and cyclic references
//! collapse to back-references on the wire.
//!
//! Every tracked occurrence starts with one tag byte:
//!
//! | tag | value | meaning |
//! |---|---|---|
//! | `NULL_TAG` | -3 | the value is absent |
//! | `REF_TAG` | -2 | back-reference; a varint id follows |
//! | `NOT_NULL_VALUE_TAG` | -1 | non-null, untracked; payload follows |
//! | `REF_VALUE_TAG` | 0 | first occurrence of a tracked value; payload follows |
//!
//! On the write side, heap values are keyed by their allocation address and
//! length. Primitives reaching a tracked slot are keyed through a canonical
//! per-`(kind, bits)` box, so two equal primitives at two slots decode as
//! one shared reference.
//!
//! On the read side, a first occurrence reserves the next id before its
//! payload is read; composite readers call [`RefResolver::reference`]
//! immediately after allocating, so a cycle through the composite finds the
//! slot already filled.

use std::collections::HashMap;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::value::Value;

/// The value is absent.
pub const NULL_TAG: i8 = -3;
/// A back-reference to an already-written object; a varint id follows.
pub const REF_TAG: i8 = -2;
/// A non-null value outside reference tracking; the payload follows.
pub const NOT_NULL_VALUE_TAG: i8 = -1;
/// First occurrence of a tracked value; the payload follows.
pub const REF_VALUE_TAG: i8 = 0;

/// Write-side identity key: allocation address plus length, so two views
/// that disagree on extent stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RefKey {
    addr: usize,
    len: usize,
}

/// Canonical key for a primitive participating in identity. Floats are
/// keyed by bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PrimitiveKey {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(u32),
    Float64(u64),
    Date(i32),
    Timestamp(i64),
}

impl PrimitiveKey {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(Self::Bool(*v)),
            Value::Int8(v) => Some(Self::Int8(*v)),
            Value::Int16(v) => Some(Self::Int16(*v)),
            Value::Int32(v) => Some(Self::Int32(*v)),
            Value::Int64(v) => Some(Self::Int64(*v)),
            Value::Float32(v) => Some(Self::Float32(v.to_bits())),
            Value::Float64(v) => Some(Self::Float64(v.to_bits())),
            Value::Date(v) => Some(Self::Date(*v)),
            Value::Timestamp(v) => Some(Self::Timestamp(*v)),
            _ => None,
        }
    }
}

fn heap_key(value: &Value) -> Option<RefKey> {
    fn key<T>(rc: &Rc<T>, len: usize) -> RefKey {
        RefKey { addr: Rc::as_ptr(rc) as *const () as usize, len }
    }
    match value {
        Value::String(s) => Some(key(s, s.len())),
        Value::Binary(b) => Some(key(b, b.len())),
        Value::BoolArray(a) => Some(key(a, a.len())),
        Value::Int8Array(a) => Some(key(a, a.len())),
        Value::Int16Array(a) => Some(key(a, a.len())),
        Value::Int32Array(a) => Some(key(a, a.len())),
        Value::Int64Array(a) => Some(key(a, a.len())),
        Value::Float32Array(a) => Some(key(a, a.len())),
        Value::Float64Array(a) => Some(key(a, a.len())),
        Value::List(l) => Some(key(l, 0)),
        Value::Set(s) => Some(key(s, 0)),
        Value::Map(m) => Some(key(m, 0)),
        Value::Struct(s) => Some(key(s, 0)),
        _ => None,
    }
}

/// Tracks written and read objects for one stream.
#[derive(Debug, Default)]
pub struct RefResolver {
    ref_tracking: bool,
    next_write_ref_id: u32,
    written_objects: HashMap<RefKey, u32>,
    boxed_primitives: HashMap<PrimitiveKey, u32>,
    read_objects: Vec<Option<Value>>,
    pending_ref_ids: Vec<u32>,
    read_object: Option<Value>,
}

impl RefResolver {
    #[must_use]
    pub fn new(ref_tracking: bool) -> Self {
        Self { ref_tracking, ..Self::default() }
    }

    pub fn set_ref_tracking(&mut self, ref_tracking: bool) {
        self.ref_tracking = ref_tracking;
    }

    #[must_use]
    pub fn ref_tracking(&self) -> bool { self.ref_tracking }

    /// Writes the reference tag (and back-reference id) for `value`.
    ///
    /// Returns `true` when the value is fully written, i.e. no payload must
    /// follow: nulls and back-references.
    pub fn write_ref_or_null(
        &mut self,
        buf: &mut Buffer,
        value: &Value,
    ) -> Result<bool> {
        if !self.ref_tracking {
            if value.is_null() {
                buf.write_i8(NULL_TAG);
                return Ok(true);
            }
            buf.write_i8(NOT_NULL_VALUE_TAG);
            return Ok(false);
        }

        if value.is_null() {
            buf.write_i8(NULL_TAG);
            return Ok(true);
        }
        if let Some(key) = heap_key(value) {
            if let Some(&id) = self.written_objects.get(&key) {
                buf.write_i8(REF_TAG);
                buf.write_var_uint32(id);
                return Ok(true);
            }
            let id = self.next_write_id()?;
            self.written_objects.insert(key, id);
            buf.write_i8(REF_VALUE_TAG);
            return Ok(false);
        }
        if let Some(key) = PrimitiveKey::of(value) {
            if let Some(&id) = self.boxed_primitives.get(&key) {
                buf.write_i8(REF_TAG);
                buf.write_var_uint32(id);
                return Ok(true);
            }
            let id = self.next_write_id()?;
            self.boxed_primitives.insert(key, id);
            buf.write_i8(REF_VALUE_TAG);
            return Ok(false);
        }
        buf.write_i8(NOT_NULL_VALUE_TAG);
        Ok(false)
    }

    fn next_write_id(&mut self) -> Result<u32> {
        if self.next_write_ref_id >= i32::MAX as u32 {
            return Err(Error::RefCountOverflow);
        }
        let id = self.next_write_ref_id;
        self.next_write_ref_id += 1;
        Ok(id)
    }

    /// Reads the tag of the next occurrence.
    ///
    /// For a first occurrence (`REF_VALUE_TAG`) the next read id is
    /// reserved and returned. For a back-reference the shared object is
    /// stashed as the current read object and the tag itself comes back, so
    /// callers detect both back-references and nulls with
    /// `id < NOT_NULL_VALUE_TAG`.
    pub fn try_preserve_ref_id(&mut self, buf: &mut Buffer) -> Result<i32> {
        let tag = buf.read_i8()?;
        if tag == REF_TAG {
            let id = buf.read_var_uint32()?;
            self.read_object = Some(self.get_read_object(id)?);
            return Ok(i32::from(REF_TAG));
        }
        self.read_object = None;
        if tag == REF_VALUE_TAG {
            return self.preserve_ref_id();
        }
        Ok(i32::from(tag))
    }

    /// Reserves the next read id: appends a hole and records the id on the
    /// pending stack for [`RefResolver::reference`] to fill.
    pub fn preserve_ref_id(&mut self) -> Result<i32> {
        if !self.ref_tracking {
            return Ok(i32::from(NOT_NULL_VALUE_TAG));
        }
        if self.read_objects.len() >= i32::MAX as usize {
            return Err(Error::RefCountOverflow);
        }
        let id = self.read_objects.len() as u32;
        self.read_objects.push(None);
        self.pending_ref_ids.push(id);
        Ok(id as i32)
    }

    /// Fills the most recently reserved slot with `value`.
    ///
    /// Composite readers call this immediately after allocating and before
    /// descending into children, so cycles through the composite resolve to
    /// the same instance.
    pub fn reference(&mut self, value: Value) {
        if !self.ref_tracking {
            return;
        }
        if let Some(id) = self.pending_ref_ids.pop() {
            self.read_objects[id as usize] = Some(value);
        }
    }

    /// The object previously read under `id`.
    pub fn get_read_object(&self, id: u32) -> Result<Value> {
        self.read_objects
            .get(id as usize)
            .and_then(Clone::clone)
            .ok_or(Error::BadBackReference(id))
    }

    /// The object stashed by the last back-reference, or `Null` when the
    /// last tag was a null marker.
    #[must_use]
    pub fn current_read_object(&self) -> Value {
        self.read_object.clone().unwrap_or(Value::Null)
    }

    /// Records `value` under a reserved id. Negative stub ids are ignored.
    pub fn set_read_object(&mut self, id: i32, value: Value) {
        if self.ref_tracking && id >= 0 {
            self.read_objects[id as usize] = Some(value);
        }
    }

    pub fn reset_write(&mut self) {
        self.next_write_ref_id = 0;
        self.written_objects.clear();
        self.boxed_primitives.clear();
    }

    pub fn reset_read(&mut self) {
        self.read_objects.clear();
        self.pending_ref_ids.clear();
        self.read_object = None;
    }

    #[cfg(test)]
    pub(crate) fn force_next_write_id(&mut self, id: u32) {
        self.next_write_ref_id = id;
    }
}
