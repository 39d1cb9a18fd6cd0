//! The codec instance: frame layout, dispatch, and the public surface.
//!
//! A frame is one `serialize` call's bytes:
//!
//! ```text
//! i16 magic number            0x62D4, little-endian
//! u8  flags                   bit 0 IS_NULL, bit 1 IS_LITTLE_ENDIAN,
//!                             bit 2 IS_CROSS_LANGUAGE, bit 3 IS_OUT_OF_BAND
//! u8  peer language           present when IS_CROSS_LANGUAGE is set
//! ...                         the value, via dispatch
//! ```
//!
//! A [`Codec`] owns its buffer and resolver state for the duration of one
//! call and resets them at the end, so an instance can be reused (and
//! pooled) but never shared across threads.

use std::collections::VecDeque;
use std::rc::Rc;

use bitflags::bitflags;
use getset::CopyGetters;
use tracing::trace;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::resolver::reference::{RefResolver, NOT_NULL_VALUE_TAG};
use crate::resolver::types::TypeResolver;
use crate::schema::StructSchema;
use crate::value::Value;

/// The first two bytes of every stream, little-endian.
pub const MAGIC_NUMBER: i16 = 0x62D4;

bitflags! {
    /// The frame header bitmap.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u8 {
        const IS_NULL           = 0b0001;
        const IS_LITTLE_ENDIAN  = 0b0010;
        const IS_CROSS_LANGUAGE = 0b0100;
        const IS_OUT_OF_BAND    = 0b1000;
    }
}

/// The language tag carried in a cross-language frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Language {
    Xlang = 0,
    Java = 1,
    Python = 2,
    Cpp = 3,
    Go = 4,
    JavaScript = 5,
    Rust = 6,
    Dart = 7,
}

impl TryFrom<u8> for Language {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Xlang),
            1 => Ok(Self::Java),
            2 => Ok(Self::Python),
            3 => Ok(Self::Cpp),
            4 => Ok(Self::Go),
            5 => Ok(Self::JavaScript),
            6 => Ok(Self::Rust),
            7 => Ok(Self::Dart),
            _ => Err(Error::Malformed("unknown peer language tag")),
        }
    }
}

/// A byte payload that may travel beside the stream instead of inside it.
pub trait BufferObject {
    /// Size of the payload in bytes.
    fn total_bytes(&self) -> usize;

    /// Appends the payload to `buf`.
    fn write_to(&self, buf: &mut Buffer);

    /// The payload as an owned buffer.
    fn to_buffer(&self) -> Buffer;
}

/// Decides per payload whether it stays in-band (`true`) or is transported
/// out of band (`false`). The callback keeps the object either way.
pub type BufferCallback = Box<dyn FnMut(Box<dyn BufferObject>) -> bool>;

/// A byte-slice payload behind the out-of-band hook.
pub struct ByteSliceBufferObject(Rc<Vec<u8>>);

impl ByteSliceBufferObject {
    #[must_use]
    pub fn new(data: Rc<Vec<u8>>) -> Self { Self(data) }
}

impl BufferObject for ByteSliceBufferObject {
    fn total_bytes(&self) -> usize { self.0.len() }

    fn write_to(&self, buf: &mut Buffer) { buf.write_binary(&self.0) }

    fn to_buffer(&self) -> Buffer { Buffer::from_bytes(&self.0) }
}

/// Configures and builds [`Codec`] instances.
#[derive(Debug, Clone, CopyGetters)]
pub struct CodecBuilder {
    /// Whether shared and cyclic references are tracked.
    #[get_copy = "pub"]
    reference_tracking: bool,
    /// The protocol mode; only [`Language::Xlang`] frames are produced.
    #[get_copy = "pub"]
    language: Language,
}

impl Default for CodecBuilder {
    fn default() -> Self {
        Self { reference_tracking: true, language: Language::Xlang }
    }
}

impl CodecBuilder {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn with_reference_tracking(mut self, on: bool) -> Self {
        self.reference_tracking = on;
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    #[must_use]
    pub fn build(&self) -> Codec {
        Codec {
            type_resolver: TypeResolver::new(),
            ref_resolver: RefResolver::new(self.reference_tracking),
            language: self.language,
            peer_language: self.language,
            buffer: Buffer::new(),
            buffer_callback: None,
            out_of_band: None,
        }
    }
}

/// Encodes and decodes value graphs. Not safe for concurrent use; a
/// process-wide [`CodecPool`](crate::pool::CodecPool) hands out exclusive
/// instances instead.
pub struct Codec {
    pub(crate) type_resolver: TypeResolver,
    pub(crate) ref_resolver: RefResolver,
    language: Language,
    peer_language: Language,
    buffer: Buffer,
    buffer_callback: Option<BufferCallback>,
    out_of_band: Option<VecDeque<Buffer>>,
}

impl Default for Codec {
    fn default() -> Self { CodecBuilder::default().build() }
}

impl Codec {
    /// A codec with reference tracking on.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Binds a struct schema to a namespaced wire name.
    pub fn register_named_type(
        &mut self,
        namespace: &str,
        name: &str,
        schema: StructSchema,
    ) -> Result<()> {
        self.type_resolver.register_named_type(namespace, name, schema)
    }

    /// Binds a struct schema to a user-reserved numeric id.
    pub fn register_type_id(
        &mut self,
        id: u16,
        schema: StructSchema,
    ) -> Result<()> {
        self.type_resolver.register_type_id(id, schema)
    }

    /// Turns reference tracking on or off for subsequent calls.
    pub fn set_reference_tracking(&mut self, on: bool) {
        self.ref_resolver.set_ref_tracking(on);
    }

    /// Sets the protocol mode.
    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    /// The language of the last decoded frame's producer.
    #[must_use]
    pub fn peer_language(&self) -> Language { self.peer_language }

    /// Encodes `value` into a fresh byte vector.
    pub fn serialize(&mut self, value: &Value) -> Result<Vec<u8>> {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.reset();
        let result = self.serialize_into(&mut buffer, value, None);
        let bytes = buffer.written().to_vec();
        self.buffer = buffer;
        result.map(|()| bytes)
    }

    /// Encodes `value` into `buf`, optionally routing byte payloads through
    /// an out-of-band callback.
    pub fn serialize_into(
        &mut self,
        buf: &mut Buffer,
        value: &Value,
        callback: Option<BufferCallback>,
    ) -> Result<()> {
        self.buffer_callback = callback;
        let result = self.write_frame(buf, value);
        self.reset_write();
        result
    }

    fn write_frame(&mut self, buf: &mut Buffer, value: &Value) -> Result<()> {
        if self.language != Language::Xlang {
            return Err(Error::UnsupportedLanguage(self.language));
        }
        buf.write_i16(MAGIC_NUMBER);
        let mut flags =
            FrameFlags::IS_LITTLE_ENDIAN | FrameFlags::IS_CROSS_LANGUAGE;
        if value.is_null() {
            flags |= FrameFlags::IS_NULL;
        }
        if self.buffer_callback.is_some() {
            flags |= FrameFlags::IS_OUT_OF_BAND;
        }
        buf.write_u8(flags.bits());
        buf.write_u8(Language::Rust as u8);
        trace!(flags = flags.bits(), "writing frame");
        self.write_referencable(buf, value)
    }

    /// Decodes one value from `data`.
    pub fn deserialize(&mut self, data: &[u8]) -> Result<Value> {
        let mut buf = Buffer::from_bytes(data);
        self.deserialize_from(&mut buf, None)
    }

    /// Decodes one value from `buf`, with the out-of-band buffers the
    /// producing side excluded from the stream, if any.
    pub fn deserialize_from(
        &mut self,
        buf: &mut Buffer,
        out_of_band: Option<Vec<Buffer>>,
    ) -> Result<Value> {
        self.out_of_band = out_of_band.map(VecDeque::from);
        let result = self.read_frame(buf);
        self.reset_read();
        result
    }

    fn read_frame(&mut self, buf: &mut Buffer) -> Result<Value> {
        let magic = buf.read_i16()?;
        if magic != MAGIC_NUMBER {
            return Err(Error::BadMagic { found: magic as u16 });
        }
        let flags = FrameFlags::from_bits_truncate(buf.read_u8()?);
        trace!(flags = flags.bits(), "reading frame");
        if flags.contains(FrameFlags::IS_NULL) {
            return Ok(Value::Null);
        }
        if !flags.contains(FrameFlags::IS_LITTLE_ENDIAN) {
            return Err(Error::BigEndianPeer);
        }
        if flags.contains(FrameFlags::IS_CROSS_LANGUAGE) {
            self.peer_language = Language::try_from(buf.read_u8()?)?;
        } else {
            self.peer_language = self.language;
        }
        if flags.contains(FrameFlags::IS_OUT_OF_BAND) {
            if self.out_of_band.is_none() {
                return Err(Error::MissingOutOfBand(
                    "the stream was produced with an out-of-band callback \
                     but no buffers were supplied",
                ));
            }
        } else if self.out_of_band.is_some() {
            return Err(Error::MissingOutOfBand(
                "out-of-band buffers were supplied but the stream is fully \
                 in-band",
            ));
        }
        self.read_referencable(buf)
    }

    /// Writes one value with the full dynamic protocol: reference tag, type
    /// tag, payload.
    pub(crate) fn write_referencable(
        &mut self,
        buf: &mut Buffer,
        value: &Value,
    ) -> Result<()> {
        let fully_written = self.ref_resolver.write_ref_or_null(buf, value)?;
        if !fully_written {
            let info = self.type_resolver.info_for_value(value)?;
            self.type_resolver.write_type_info(buf, &info)?;
            info.serializer().clone().write(self, buf, value)?;
        }
        Ok(())
    }

    /// Reads one value written by [`Codec::write_referencable`].
    pub(crate) fn read_referencable(
        &mut self,
        buf: &mut Buffer,
    ) -> Result<Value> {
        let ref_id = self.ref_resolver.try_preserve_ref_id(buf)?;
        if ref_id < i32::from(NOT_NULL_VALUE_TAG) {
            return Ok(self.ref_resolver.current_read_object());
        }
        let info = self.type_resolver.read_type_info(buf)?;
        let value = info.serializer().clone().read(self, buf)?;
        self.ref_resolver.set_read_object(ref_id, value.clone());
        Ok(value)
    }

    /// Writes a byte payload through the out-of-band hook.
    pub(crate) fn write_buffer_object(
        &mut self,
        buf: &mut Buffer,
        data: &Rc<Vec<u8>>,
    ) -> Result<()> {
        let in_band = match self.buffer_callback.as_mut() {
            None => true,
            Some(callback) => {
                callback(Box::new(ByteSliceBufferObject(data.clone())))
            }
        };
        buf.write_bool(in_band);
        if in_band {
            buf.write_length(data.len())?;
            buf.write_binary(data);
        }
        Ok(())
    }

    /// Reads a byte payload, pulling from the out-of-band list when the
    /// stream marked it excluded.
    pub(crate) fn read_buffer_object(
        &mut self,
        buf: &mut Buffer,
    ) -> Result<Buffer> {
        if buf.read_bool()? {
            let n = buf.read_length()?;
            return Ok(Buffer::from_vec(buf.read_binary(n)?));
        }
        self.out_of_band
            .as_mut()
            .and_then(VecDeque::pop_front)
            .ok_or(Error::MissingOutOfBand(
                "the stream references more out-of-band buffers than were \
                 supplied",
            ))
    }

    /// Clears all per-call state on both sides.
    pub fn reset(&mut self) {
        self.reset_write();
        self.reset_read();
    }

    fn reset_write(&mut self) {
        self.type_resolver.reset_write();
        self.ref_resolver.reset_write();
        self.buffer_callback = None;
    }

    fn reset_read(&mut self) {
        self.type_resolver.reset_read();
        self.ref_resolver.reset_read();
        self.out_of_band = None;
    }
}
