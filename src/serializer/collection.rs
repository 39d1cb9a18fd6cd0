//! Chunked list and set codec.
//!
//! A collection opens with its length; empty collections stop there.
//! Otherwise one flag byte describes the whole collection, and homogeneous
//! collections share a single element type tag instead of one per element:
//!
//! | bit | meaning |
//! |---|---|
//! | 0 | element reference tracking is on |
//! | 1 | at least one element is null |
//! | 2 | element type was not declared by the surrounding schema |
//! | 3 | elements have differing types |
//!
//! On the same-type path, elements carry a null/reference tag byte only
//! when bit 0 or bit 1 demands it; with neither set the payloads are
//! written back to back. The mixed-type path tags every element, then
//! writes its type info and payload on first occurrence.

use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;

use crate::buffer::Buffer;
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::resolver::reference::{NOT_NULL_VALUE_TAG, NULL_TAG};
use crate::resolver::types::{TypeId, TypeInfo, LIST, SET};
use crate::value::Value;

use super::Serializer;

bitflags! {
    /// The per-collection flag byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CollectionFlags: u8 {
        const TRACKING_REF          = 0b0001;
        const HAS_NULL              = 0b0010;
        const NOT_DECL_ELEMENT_TYPE = 0b0100;
        const NOT_SAME_TYPE         = 0b1000;
    }
}

/// Dynamic lists.
#[derive(Debug, Default)]
pub struct ListSerializer;

impl Serializer for ListSerializer {
    fn type_id(&self) -> TypeId { LIST }

    fn write(
        &self,
        codec: &mut Codec,
        buf: &mut Buffer,
        value: &Value,
    ) -> Result<()> {
        let Value::List(elements) = value else {
            return Err(Error::mismatch("list", value));
        };
        let elements = elements.borrow();
        write_collection(codec, buf, elements.as_slice())
    }

    fn read(&self, codec: &mut Codec, buf: &mut Buffer) -> Result<Value> {
        let elements = Rc::new(RefCell::new(Vec::new()));
        let value = Value::List(elements.clone());
        read_collection(codec, buf, &value, &elements)?;
        Ok(value)
    }
}

/// Dynamic sets. The wire format is identical to lists; element order is
/// preserved as written but carries no meaning to peers.
#[derive(Debug, Default)]
pub struct SetSerializer;

impl Serializer for SetSerializer {
    fn type_id(&self) -> TypeId { SET }

    fn write(
        &self,
        codec: &mut Codec,
        buf: &mut Buffer,
        value: &Value,
    ) -> Result<()> {
        let Value::Set(elements) = value else {
            return Err(Error::mismatch("set", value));
        };
        let elements = elements.borrow();
        write_collection(codec, buf, elements.as_slice())
    }

    fn read(&self, codec: &mut Codec, buf: &mut Buffer) -> Result<Value> {
        let elements = Rc::new(RefCell::new(Vec::new()));
        let value = Value::Set(elements.clone());
        read_collection(codec, buf, &value, &elements)?;
        Ok(value)
    }
}

fn write_collection(
    codec: &mut Codec,
    buf: &mut Buffer,
    elements: &[Value],
) -> Result<()> {
    buf.write_var_uint32_small7(elements.len() as u32);
    if elements.is_empty() {
        return Ok(());
    }

    let mut has_null = false;
    let mut shared_info: Option<TypeInfo> = None;
    let mut same_type = true;
    for element in elements {
        if element.is_null() {
            has_null = true;
            continue;
        }
        let info = codec.type_resolver.info_for_value(element)?;
        match &shared_info {
            None => shared_info = Some(info),
            Some(first) if !first.same_type(&info) => same_type = false,
            Some(_) => {}
        }
    }
    // A collection of nothing but nulls has no shared type to announce.
    if shared_info.is_none() {
        same_type = false;
    }

    let mut flags = CollectionFlags::NOT_DECL_ELEMENT_TYPE;
    if has_null {
        flags |= CollectionFlags::HAS_NULL;
    }
    if !same_type {
        flags |= CollectionFlags::NOT_SAME_TYPE;
    }
    if codec.ref_resolver.ref_tracking() {
        flags |= CollectionFlags::TRACKING_REF;
    }
    buf.write_u8(flags.bits());

    if same_type {
        let info = shared_info.ok_or(Error::Malformed("empty type info"))?;
        codec.type_resolver.write_type_info(buf, &info)?;
        write_same_type(codec, buf, elements, &info, flags)
    } else {
        write_mixed_types(codec, buf, elements)
    }
}

fn write_same_type(
    codec: &mut Codec,
    buf: &mut Buffer,
    elements: &[Value],
    info: &TypeInfo,
    flags: CollectionFlags,
) -> Result<()> {
    let serializer = info.serializer().clone();
    let tracking = flags.contains(CollectionFlags::TRACKING_REF);
    let tagged = tracking || flags.contains(CollectionFlags::HAS_NULL);
    for element in elements {
        if !tagged {
            serializer.write(codec, buf, element)?;
        } else if tracking {
            if !codec.ref_resolver.write_ref_or_null(buf, element)? {
                serializer.write(codec, buf, element)?;
            }
        } else if element.is_null() {
            buf.write_i8(NULL_TAG);
        } else {
            buf.write_i8(NOT_NULL_VALUE_TAG);
            serializer.write(codec, buf, element)?;
        }
    }
    Ok(())
}

fn write_mixed_types(
    codec: &mut Codec,
    buf: &mut Buffer,
    elements: &[Value],
) -> Result<()> {
    for element in elements {
        if !codec.ref_resolver.write_ref_or_null(buf, element)? {
            let info = codec.type_resolver.info_for_value(element)?;
            codec.type_resolver.write_type_info(buf, &info)?;
            info.serializer().clone().write(codec, buf, element)?;
        }
    }
    Ok(())
}

fn read_collection(
    codec: &mut Codec,
    buf: &mut Buffer,
    value: &Value,
    elements: &Rc<RefCell<Vec<Value>>>,
) -> Result<()> {
    let n = buf.read_var_uint32_small7()? as usize;
    codec.ref_resolver.reference(value.clone());
    if n == 0 {
        return Ok(());
    }
    let flags = CollectionFlags::from_bits_truncate(buf.read_u8()?);
    elements.borrow_mut().reserve(n);

    if !flags.contains(CollectionFlags::NOT_SAME_TYPE) {
        let info = codec.type_resolver.read_type_info(buf)?;
        read_same_type(codec, buf, elements, &info, flags, n)
    } else {
        read_mixed_types(codec, buf, elements, n)
    }
}

fn read_same_type(
    codec: &mut Codec,
    buf: &mut Buffer,
    elements: &Rc<RefCell<Vec<Value>>>,
    info: &TypeInfo,
    flags: CollectionFlags,
    n: usize,
) -> Result<()> {
    let serializer = info.serializer().clone();
    let tracking = flags.contains(CollectionFlags::TRACKING_REF);
    let tagged = tracking || flags.contains(CollectionFlags::HAS_NULL);
    for _ in 0..n {
        let element = if !tagged {
            serializer.read(codec, buf)?
        } else if tracking {
            let ref_id = codec.ref_resolver.try_preserve_ref_id(buf)?;
            if ref_id < i32::from(NOT_NULL_VALUE_TAG) {
                codec.ref_resolver.current_read_object()
            } else {
                let element = serializer.read(codec, buf)?;
                codec.ref_resolver.set_read_object(ref_id, element.clone());
                element
            }
        } else {
            match buf.read_i8()? {
                NULL_TAG => Value::Null,
                NOT_NULL_VALUE_TAG => serializer.read(codec, buf)?,
                tag => return Err(Error::UnexpectedRefTag(tag)),
            }
        };
        elements.borrow_mut().push(element);
    }
    Ok(())
}

fn read_mixed_types(
    codec: &mut Codec,
    buf: &mut Buffer,
    elements: &Rc<RefCell<Vec<Value>>>,
    n: usize,
) -> Result<()> {
    for _ in 0..n {
        let ref_id = codec.ref_resolver.try_preserve_ref_id(buf)?;
        let element = if ref_id < i32::from(NOT_NULL_VALUE_TAG) {
            codec.ref_resolver.current_read_object()
        } else {
            let info = codec.type_resolver.read_type_info(buf)?;
            let element = info.serializer().clone().read(codec, buf)?;
            codec.ref_resolver.set_read_object(ref_id, element.clone());
            element
        };
        elements.borrow_mut().push(element);
    }
    Ok(())
}
