//! Chunked map codec.
//!
//! After the entry count, a map is a run of single-entry null headers and
//! multi-entry chunks. Any entry with an absent key or value consumes one
//! header byte from the null vocabulary (plus the present side's value,
//! written with full type information). Consecutive entries whose key and
//! value types match the running pair are grouped into chunks of at most
//! 255 entries: the chunk header byte is reserved, type info for key and
//! value is written once, and the header and entry count are patched in
//! place when the chunk closes. Chunks after the first set the declared
//! bits instead of repeating type info, so a homogeneous map announces its
//! types exactly once.

use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;

use crate::buffer::Buffer;
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::resolver::reference::NOT_NULL_VALUE_TAG;
use crate::resolver::types::{TypeId, TypeInfo, MAP};
use crate::serializer::Serializer;
use crate::value::{MapValue, Value};

/// Largest number of entries one chunk may hold.
pub const MAX_CHUNK_SIZE: usize = 255;

bitflags! {
    /// Map header bits, shared by null-run headers and chunk headers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u8 {
        const TRACKING_KEY_REF   = 0b00000001;
        const KEY_HAS_NULL       = 0b00000010;
        const KEY_DECL_TYPE      = 0b00000100;
        const TRACKING_VALUE_REF = 0b00001000;
        const VALUE_HAS_NULL     = 0b00010000;
        const VALUE_DECL_TYPE    = 0b00100000;
    }
}

impl MapFlags {
    /// Both sides of the entry are null.
    pub const KV_NULL: MapFlags = MapFlags::KEY_HAS_NULL
        .union(MapFlags::VALUE_HAS_NULL);
}

#[derive(Debug, Default)]
pub struct MapSerializer;

impl Serializer for MapSerializer {
    fn type_id(&self) -> TypeId { MAP }

    fn write(
        &self,
        codec: &mut Codec,
        buf: &mut Buffer,
        value: &Value,
    ) -> Result<()> {
        let Value::Map(map) = value else {
            return Err(Error::mismatch("map", value));
        };
        let map = map.borrow();
        write_map(codec, buf, &map)
    }

    fn read(&self, codec: &mut Codec, buf: &mut Buffer) -> Result<Value> {
        read_map(codec, buf)
    }
}

fn write_map(
    codec: &mut Codec,
    buf: &mut Buffer,
    map: &MapValue,
) -> Result<()> {
    buf.write_var_uint32_small7(map.len() as u32);
    if map.is_empty() {
        return Ok(());
    }

    let entries = map.entries();
    let tracking = codec.ref_resolver.ref_tracking();
    let mut index = 0;
    let mut prev_key_info: Option<TypeInfo> = None;
    let mut prev_value_info: Option<TypeInfo> = None;

    while index < entries.len() {
        let (key, value) = &entries[index];

        // Null runs consume one entry per header byte.
        if key.is_null() || value.is_null() {
            if key.is_null() && value.is_null() {
                buf.write_u8(MapFlags::KV_NULL.bits());
            } else if key.is_null() {
                buf.write_u8(
                    (MapFlags::KEY_HAS_NULL | MapFlags::TRACKING_VALUE_REF)
                        .bits(),
                );
                codec.write_referencable(buf, value)?;
            } else {
                buf.write_u8(
                    (MapFlags::VALUE_HAS_NULL | MapFlags::TRACKING_KEY_REF)
                        .bits(),
                );
                codec.write_referencable(buf, key)?;
            }
            index += 1;
            continue;
        }

        // Open a chunk: reserve the header and size bytes, write type info
        // unless the running chunk types still apply.
        let header_at = buf.writer_index();
        buf.write_u8(0);
        buf.write_u8(0);

        let key_info = codec.type_resolver.info_for_value(key)?;
        let value_info = codec.type_resolver.info_for_value(value)?;
        let mut header = MapFlags::empty();
        if tracking {
            header |=
                MapFlags::TRACKING_KEY_REF | MapFlags::TRACKING_VALUE_REF;
        }
        if prev_key_info
            .as_ref()
            .is_some_and(|prev| prev.same_type(&key_info))
        {
            header |= MapFlags::KEY_DECL_TYPE;
        } else {
            codec.type_resolver.write_type_info(buf, &key_info)?;
        }
        if prev_value_info
            .as_ref()
            .is_some_and(|prev| prev.same_type(&value_info))
        {
            header |= MapFlags::VALUE_DECL_TYPE;
        } else {
            codec.type_resolver.write_type_info(buf, &value_info)?;
        }
        buf.put_u8(header_at, header.bits());

        let key_serializer = key_info.serializer().clone();
        let value_serializer = value_info.serializer().clone();
        let mut size = 0usize;
        while index < entries.len() && size < MAX_CHUNK_SIZE {
            let (key, value) = &entries[index];
            if key.is_null() || value.is_null() {
                break;
            }
            let ki = codec.type_resolver.info_for_value(key)?;
            let vi = codec.type_resolver.info_for_value(value)?;
            if !ki.same_type(&key_info) || !vi.same_type(&value_info) {
                break;
            }

            if tracking {
                if !codec.ref_resolver.write_ref_or_null(buf, key)? {
                    key_serializer.write(codec, buf, key)?;
                }
                if !codec.ref_resolver.write_ref_or_null(buf, value)? {
                    value_serializer.write(codec, buf, value)?;
                }
            } else {
                key_serializer.write(codec, buf, key)?;
                value_serializer.write(codec, buf, value)?;
            }
            size += 1;
            index += 1;
        }
        buf.put_u8(header_at + 1, size as u8);
        prev_key_info = Some(key_info);
        prev_value_info = Some(value_info);
    }
    Ok(())
}

fn read_map(codec: &mut Codec, buf: &mut Buffer) -> Result<Value> {
    let n = buf.read_var_uint32_small7()? as usize;
    let map = Rc::new(RefCell::new(MapValue::new()));
    let value = Value::Map(map.clone());
    // Fill the reserved slot before any entry is read, so an entry that
    // points back at this map resolves to the same instance.
    codec.ref_resolver.reference(value.clone());

    let mut key_serializer: Option<Rc<dyn Serializer>> = None;
    let mut value_serializer: Option<Rc<dyn Serializer>> = None;
    let mut remaining = n;
    while remaining > 0 {
        let header = MapFlags::from_bits_truncate(buf.read_u8()?);

        if header.intersects(MapFlags::KV_NULL) {
            let (k, v) = if header.contains(MapFlags::KV_NULL) {
                (Value::Null, Value::Null)
            } else if header.contains(MapFlags::KEY_HAS_NULL) {
                (Value::Null, codec.read_referencable(buf)?)
            } else {
                (codec.read_referencable(buf)?, Value::Null)
            };
            map.borrow_mut().insert(k, v);
            remaining -= 1;
            continue;
        }

        let size = buf.read_u8()? as usize;
        if size == 0 {
            return Err(Error::ChunkSizeZero);
        }
        if !header.contains(MapFlags::KEY_DECL_TYPE) {
            let info = codec.type_resolver.read_type_info(buf)?;
            key_serializer = Some(info.serializer().clone());
        }
        if !header.contains(MapFlags::VALUE_DECL_TYPE) {
            let info = codec.type_resolver.read_type_info(buf)?;
            value_serializer = Some(info.serializer().clone());
        }
        let key_serializer = key_serializer
            .clone()
            .ok_or(Error::Malformed("chunk declares an unseen key type"))?;
        let value_serializer = value_serializer
            .clone()
            .ok_or(Error::Malformed("chunk declares an unseen value type"))?;
        let track_key = header.contains(MapFlags::TRACKING_KEY_REF);
        let track_value = header.contains(MapFlags::TRACKING_VALUE_REF);

        for _ in 0..size {
            if remaining == 0 {
                return Err(Error::Malformed(
                    "map chunk size exceeds the entry count",
                ));
            }
            let k = read_slot(codec, buf, &key_serializer, track_key)?;
            let v = read_slot(codec, buf, &value_serializer, track_value)?;
            map.borrow_mut().insert(k, v);
            remaining -= 1;
        }
    }
    Ok(value)
}

fn read_slot(
    codec: &mut Codec,
    buf: &mut Buffer,
    serializer: &Rc<dyn Serializer>,
    tracking: bool,
) -> Result<Value> {
    if !tracking {
        return serializer.read(codec, buf);
    }
    let ref_id = codec.ref_resolver.try_preserve_ref_id(buf)?;
    if ref_id < i32::from(NOT_NULL_VALUE_TAG) {
        return Ok(codec.ref_resolver.current_read_object());
    }
    let value = serializer.read(codec, buf)?;
    codec.ref_resolver.set_read_object(ref_id, value.clone());
    Ok(value)
}
