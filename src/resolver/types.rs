//! Maps host types to wire type identity and back.
//!
//! Built-in kinds are identified by a small integer id. User types carry
//! either a user-reserved id (encoded as `(id << 8) | STRUCT`) or a
//! `(namespace, name)` pair written as two meta-strings after the id
//! varint. The resolver also keeps the legacy native-mode machinery: a
//! structural string form of a schema, cached both ways, interned through a
//! per-stream dynamic string table.

use std::collections::HashMap;
use std::hash::Hasher;
use std::rc::Rc;

use fnv::FnvHasher;
use tracing::debug;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::meta::{Encoding, MetaStringDecoder, MetaStringEncoder};
use crate::schema::{Schema, StructSchema, TypeKey};
use crate::serializer::{self, Serializer};
use crate::value::Value;

use super::meta_string::{MetaStringBytes, MetaStringResolver};

/// Wire type id.
pub type TypeId = u32;

pub const NA: TypeId = 0;
pub const BOOL: TypeId = 1;
pub const INT8: TypeId = 2;
pub const INT16: TypeId = 3;
pub const INT32: TypeId = 4;
pub const VAR_INT32: TypeId = 5;
pub const INT64: TypeId = 6;
pub const VAR_INT64: TypeId = 7;
pub const SLI_INT64: TypeId = 8;
pub const FLOAT16: TypeId = 9;
pub const FLOAT32: TypeId = 10;
pub const FLOAT64: TypeId = 11;
pub const STRING: TypeId = 12;
pub const ENUM: TypeId = 13;
pub const NAMED_ENUM: TypeId = 14;
pub const STRUCT: TypeId = 15;
pub const COMPATIBLE_STRUCT: TypeId = 16;
pub const NAMED_STRUCT: TypeId = 17;
pub const NAMED_COMPATIBLE_STRUCT: TypeId = 18;
pub const EXT: TypeId = 19;
pub const NAMED_EXT: TypeId = 20;
pub const LIST: TypeId = 21;
pub const SET: TypeId = 22;
pub const MAP: TypeId = 23;
pub const DURATION: TypeId = 24;
pub const TIMESTAMP: TypeId = 25;
pub const LOCAL_DATE: TypeId = 26;
pub const DECIMAL128: TypeId = 27;
pub const BINARY: TypeId = 28;
pub const ARRAY: TypeId = 29;
pub const BOOL_ARRAY: TypeId = 30;
pub const INT8_ARRAY: TypeId = 31;
pub const INT16_ARRAY: TypeId = 32;
pub const INT32_ARRAY: TypeId = 33;
pub const INT64_ARRAY: TypeId = 34;
pub const FLOAT16_ARRAY: TypeId = 35;
pub const FLOAT32_ARRAY: TypeId = 36;
pub const FLOAT64_ARRAY: TypeId = 37;
pub const DECIMAL256: TypeId = 111;

/// Payloads up to this length inline an encoding byte in the legacy
/// dynamic string table; longer ones carry a hash.
const LEGACY_SMALL_STRING_THRESHOLD: usize = 16;

/// Whether the low byte of a type id announces a namespaced kind, i.e. one
/// followed by namespace and name meta-strings.
#[must_use]
pub fn is_namespaced_type(type_id: TypeId) -> bool {
    matches!(
        type_id,
        NAMED_ENUM | NAMED_STRUCT | NAMED_COMPATIBLE_STRUCT | NAMED_EXT
    )
}

/// Resolved identity of one type: its wire id, optional namespaced name,
/// and the serializer that owns its payload format.
#[derive(Clone)]
pub struct TypeInfo {
    type_id: TypeId,
    namespace_bytes: Option<Rc<MetaStringBytes>>,
    name_bytes: Option<Rc<MetaStringBytes>>,
    serializer: Rc<dyn Serializer>,
    key: Option<TypeKey>,
    schema: Option<Rc<StructSchema>>,
}

impl TypeInfo {
    #[must_use]
    pub fn type_id(&self) -> TypeId { self.type_id }

    #[must_use]
    pub fn serializer(&self) -> &Rc<dyn Serializer> { &self.serializer }

    #[must_use]
    pub fn key(&self) -> Option<&TypeKey> { self.key.as_ref() }

    #[must_use]
    pub fn schema(&self) -> Option<&Rc<StructSchema>> { self.schema.as_ref() }

    /// Whether two infos denote the same wire type. Namespaced kinds share
    /// a type id, so their name hashes break the tie.
    #[must_use]
    pub fn same_type(&self, other: &TypeInfo) -> bool {
        self.type_id == other.type_id
            && hash_of(&self.namespace_bytes) == hash_of(&other.namespace_bytes)
            && hash_of(&self.name_bytes) == hash_of(&other.name_bytes)
    }
}

fn hash_of(bytes: &Option<Rc<MetaStringBytes>>) -> i64 {
    bytes.as_ref().map_or(0, |b| b.hashcode())
}

impl std::fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeInfo")
            .field("type_id", &self.type_id)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Resolves host values to [`TypeInfo`] and wire type ids back to local
/// bindings, caching per-stream string state in both directions.
pub struct TypeResolver {
    id_to_info: HashMap<TypeId, TypeInfo>,
    key_to_info: HashMap<TypeKey, TypeInfo>,
    hash_to_info: HashMap<(i64, i64), TypeInfo>,
    meta_strings: MetaStringResolver,
    namespace_encoder: MetaStringEncoder,
    namespace_decoder: MetaStringDecoder,
    type_name_encoder: MetaStringEncoder,
    type_name_decoder: MetaStringDecoder,
    // Legacy native-mode state.
    schema_to_string: HashMap<Schema, String>,
    string_to_schema: HashMap<String, Schema>,
    dynamic_string_to_id: HashMap<String, u16>,
    dynamic_id_to_string: HashMap<u16, String>,
    dynamic_string_id: u16,
}

impl Default for TypeResolver {
    fn default() -> Self { Self::new() }
}

impl TypeResolver {
    #[must_use]
    pub fn new() -> Self {
        let mut resolver = Self {
            id_to_info: HashMap::new(),
            key_to_info: HashMap::new(),
            hash_to_info: HashMap::new(),
            meta_strings: MetaStringResolver::new(),
            namespace_encoder: MetaStringEncoder::new('.', '_'),
            namespace_decoder: MetaStringDecoder::new('.', '_'),
            type_name_encoder: MetaStringEncoder::new('$', '_'),
            type_name_decoder: MetaStringDecoder::new('$', '_'),
            schema_to_string: HashMap::new(),
            string_to_schema: HashMap::new(),
            dynamic_string_to_id: HashMap::new(),
            dynamic_id_to_string: HashMap::new(),
            dynamic_string_id: 0,
        };
        resolver.register_builtins();
        resolver
    }

    fn register_builtins(&mut self) {
        let builtins: &[(TypeId, Rc<dyn Serializer>)] = &[
            (BOOL, Rc::new(serializer::primitive::BoolSerializer)),
            (INT8, Rc::new(serializer::primitive::Int8Serializer)),
            (INT16, Rc::new(serializer::primitive::Int16Serializer)),
            (INT32, Rc::new(serializer::primitive::Int32Serializer)),
            (INT64, Rc::new(serializer::primitive::Int64Serializer)),
            (FLOAT32, Rc::new(serializer::primitive::Float32Serializer)),
            (FLOAT64, Rc::new(serializer::primitive::Float64Serializer)),
            (STRING, Rc::new(serializer::string::StringSerializer)),
            (TIMESTAMP, Rc::new(serializer::primitive::TimestampSerializer)),
            (LOCAL_DATE, Rc::new(serializer::primitive::DateSerializer)),
            (BINARY, Rc::new(serializer::array::BinarySerializer)),
            (BOOL_ARRAY, Rc::new(serializer::array::BoolArraySerializer)),
            (INT8_ARRAY, Rc::new(serializer::array::Int8ArraySerializer)),
            (INT16_ARRAY, Rc::new(serializer::array::Int16ArraySerializer)),
            (INT32_ARRAY, Rc::new(serializer::array::Int32ArraySerializer)),
            (INT64_ARRAY, Rc::new(serializer::array::Int64ArraySerializer)),
            (
                FLOAT32_ARRAY,
                Rc::new(serializer::array::Float32ArraySerializer),
            ),
            (
                FLOAT64_ARRAY,
                Rc::new(serializer::array::Float64ArraySerializer),
            ),
            (LIST, Rc::new(serializer::collection::ListSerializer)),
            (SET, Rc::new(serializer::collection::SetSerializer)),
            (MAP, Rc::new(serializer::map::MapSerializer)),
        ];
        for (type_id, s) in builtins {
            self.id_to_info.insert(*type_id, TypeInfo {
                type_id: *type_id,
                namespace_bytes: None,
                name_bytes: None,
                serializer: s.clone(),
                key: None,
                schema: None,
            });
        }
    }

    /// Binds a struct schema to a namespaced wire name.
    pub fn register_named_type(
        &mut self,
        namespace: &str,
        name: &str,
        schema: StructSchema,
    ) -> Result<()> {
        let key = TypeKey::Named {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        };
        if self.key_to_info.contains_key(&key) {
            return Err(Error::TypeAlreadyRegistered(key.path()));
        }
        let namespace_meta = self.namespace_encoder.encode(namespace)?;
        let name_meta = self.type_name_encoder.encode(name)?;
        let namespace_bytes =
            self.meta_strings.get_meta_string_bytes(&namespace_meta);
        let name_bytes = self.meta_strings.get_meta_string_bytes(&name_meta);

        let schema = Rc::new(schema);
        let info = TypeInfo {
            type_id: NAMED_STRUCT,
            namespace_bytes: Some(namespace_bytes.clone()),
            name_bytes: Some(name_bytes.clone()),
            serializer: Rc::new(serializer::structure::StructSerializer::new(
                NAMED_STRUCT,
                key.clone(),
                schema.clone(),
            )),
            key: Some(key.clone()),
            schema: Some(schema),
        };
        self.hash_to_info.insert(
            (namespace_bytes.hashcode(), name_bytes.hashcode()),
            info.clone(),
        );
        self.key_to_info.insert(key.clone(), info);
        debug!(type_name = %key.path(), "registered named type");
        Ok(())
    }

    /// Binds a struct schema to a user-reserved numeric id.
    pub fn register_type_id(
        &mut self,
        id: u16,
        schema: StructSchema,
    ) -> Result<()> {
        let key = TypeKey::Id(id);
        if self.key_to_info.contains_key(&key) {
            return Err(Error::TypeAlreadyRegistered(key.path()));
        }
        let type_id = (TypeId::from(id) << 8) | STRUCT;
        let schema = Rc::new(schema);
        let info = TypeInfo {
            type_id,
            namespace_bytes: None,
            name_bytes: None,
            serializer: Rc::new(serializer::structure::StructSerializer::new(
                type_id,
                key.clone(),
                schema.clone(),
            )),
            key: Some(key.clone()),
            schema: Some(schema),
        };
        self.id_to_info.insert(type_id, info.clone());
        self.key_to_info.insert(key, info);
        debug!(id, "registered type id");
        Ok(())
    }

    /// Resolves the type identity of a value.
    pub fn info_for_value(&self, value: &Value) -> Result<TypeInfo> {
        let type_id = match value {
            Value::Null => {
                return Err(Error::mismatch("a concrete value", value))
            }
            Value::Bool(_) => BOOL,
            Value::Int8(_) => INT8,
            Value::Int16(_) => INT16,
            Value::Int32(_) => INT32,
            Value::Int64(_) => INT64,
            Value::Float32(_) => FLOAT32,
            Value::Float64(_) => FLOAT64,
            Value::String(_) => STRING,
            Value::Binary(_) => BINARY,
            Value::Date(_) => LOCAL_DATE,
            Value::Timestamp(_) => TIMESTAMP,
            Value::BoolArray(_) => BOOL_ARRAY,
            Value::Int8Array(_) => INT8_ARRAY,
            Value::Int16Array(_) => INT16_ARRAY,
            Value::Int32Array(_) => INT32_ARRAY,
            Value::Int64Array(_) => INT64_ARRAY,
            Value::Float32Array(_) => FLOAT32_ARRAY,
            Value::Float64Array(_) => FLOAT64_ARRAY,
            Value::List(_) => LIST,
            Value::Set(_) => SET,
            Value::Map(_) => MAP,
            Value::Struct(s) => {
                return self.info_by_key(&s.borrow().type_key);
            }
        };
        self.info_by_id(type_id)
    }

    /// Resolves a built-in or user-reserved type id.
    pub fn info_by_id(&self, type_id: TypeId) -> Result<TypeInfo> {
        self.id_to_info
            .get(&type_id)
            .cloned()
            .ok_or_else(|| Error::TypeUnregistered(format!("id {type_id}")))
    }

    /// Resolves a registration key.
    pub fn info_by_key(&self, key: &TypeKey) -> Result<TypeInfo> {
        self.key_to_info
            .get(key)
            .cloned()
            .ok_or_else(|| Error::TypeUnregistered(key.path()))
    }

    /// Resolves a [`Schema::Named`] path: `#id` for user-reserved ids,
    /// otherwise a dotted namespaced name.
    pub fn info_by_path(&self, path: &str) -> Result<TypeInfo> {
        let key = match path.strip_prefix('#') {
            Some(id) => TypeKey::Id(
                id.parse().map_err(|_| {
                    Error::TypeUnregistered(path.to_owned())
                })?,
            ),
            None => TypeKey::named(path),
        };
        self.info_by_key(&key)
    }

    /// Writes the type tag: the id varint, then namespace and name
    /// meta-strings for namespaced kinds.
    pub fn write_type_info(
        &mut self,
        buf: &mut Buffer,
        info: &TypeInfo,
    ) -> Result<()> {
        buf.write_var_uint32(info.type_id);
        if is_namespaced_type(info.type_id & 0xFF) {
            let (Some(namespace), Some(name)) =
                (&info.namespace_bytes, &info.name_bytes)
            else {
                return Err(Error::Malformed(
                    "namespaced type info without name bytes",
                ));
            };
            self.meta_strings.write_meta_string_bytes(buf, namespace);
            self.meta_strings.write_meta_string_bytes(buf, name);
        }
        Ok(())
    }

    /// Reads a type tag and resolves the local binding.
    pub fn read_type_info(&mut self, buf: &mut Buffer) -> Result<TypeInfo> {
        let type_id = buf.read_var_uint32()?;
        if !is_namespaced_type(type_id & 0xFF) {
            return self.info_by_id(type_id);
        }

        let namespace_bytes = self.meta_strings.read_meta_string_bytes(buf)?;
        let name_bytes = self.meta_strings.read_meta_string_bytes(buf)?;
        let hash_key = (namespace_bytes.hashcode(), name_bytes.hashcode());
        if let Some(info) = self.hash_to_info.get(&hash_key) {
            return Ok(info.clone());
        }

        // Miss on the hash key: decode both names and retry.
        let namespace = self
            .namespace_decoder
            .decode(namespace_bytes.data(), namespace_bytes.encoding())?;
        let name = self
            .type_name_decoder
            .decode(name_bytes.data(), name_bytes.encoding())?;
        let key = TypeKey::Named { namespace, name };
        match self.key_to_info.get(&key) {
            Some(info) => {
                let info = info.clone();
                self.hash_to_info.insert(hash_key, info.clone());
                Ok(info)
            }
            None => Err(Error::TypeUnregistered(key.path())),
        }
    }

    /// The structural string form of a schema, as used by the legacy
    /// native mode: `[]T` for primitive arrays, `list[T]`/`set[T]` for
    /// declared collections, `map[K]V`, `@path` for registered types and
    /// `any` for dynamic slots.
    pub fn schema_string(&mut self, schema: &Schema) -> String {
        if let Some(s) = self.schema_to_string.get(schema) {
            return s.clone();
        }
        let s = encode_schema_string(schema);
        self.schema_to_string.insert(schema.clone(), s.clone());
        self.string_to_schema.insert(s.clone(), schema.clone());
        s
    }

    /// Parses a structural string back to a schema, caching both ways.
    pub fn schema_from_string(&mut self, s: &str) -> Result<Schema> {
        if let Some(schema) = self.string_to_schema.get(s) {
            return Ok(schema.clone());
        }
        let schema = parse_schema_string(s)?;
        self.string_to_schema.insert(s.to_owned(), schema.clone());
        self.schema_to_string.insert(schema.clone(), s.to_owned());
        Ok(schema)
    }

    /// Writes a schema through the legacy dynamic string table.
    pub fn write_schema_string(
        &mut self,
        buf: &mut Buffer,
        schema: &Schema,
    ) -> Result<()> {
        let s = self.schema_string(schema);
        self.write_dynamic_string(buf, &s)
    }

    /// Reads a schema through the legacy dynamic string table.
    pub fn read_schema_string(&mut self, buf: &mut Buffer) -> Result<Schema> {
        let s = self.read_dynamic_string(buf)?;
        self.schema_from_string(&s)
    }

    fn write_dynamic_string(
        &mut self,
        buf: &mut Buffer,
        s: &str,
    ) -> Result<()> {
        if let Some(&id) = self.dynamic_string_to_id.get(s) {
            buf.write_var_uint32(((u32::from(id) + 1) << 1) | 1);
            return Ok(());
        }
        let id = self.dynamic_string_id;
        self.dynamic_string_id += 1;
        self.dynamic_string_to_id.insert(s.to_owned(), id);

        buf.write_var_uint32((s.len() as u32) << 1);
        if s.len() <= LEGACY_SMALL_STRING_THRESHOLD {
            buf.write_u8(Encoding::Utf8 as u8);
        } else {
            buf.write_i64(legacy_string_hash(s));
        }
        buf.write_binary(s.as_bytes());
        Ok(())
    }

    fn read_dynamic_string(&mut self, buf: &mut Buffer) -> Result<String> {
        let header = buf.read_var_uint32()?;
        if header & 1 != 0 {
            let id = (header >> 1).wrapping_sub(1);
            return self
                .dynamic_id_to_string
                .get(&(id as u16))
                .cloned()
                .ok_or(Error::InvalidDynamicId(header >> 1));
        }
        let length = (header >> 1) as usize;
        if length <= LEGACY_SMALL_STRING_THRESHOLD {
            buf.read_u8()?;
        } else {
            buf.read_i64()?;
        }
        let data = buf.read_binary(length)?;
        let s = String::from_utf8(data)
            .map_err(|_| Error::Malformed("type string is not UTF-8"))?;
        let id = self.dynamic_string_id;
        self.dynamic_string_id += 1;
        self.dynamic_id_to_string.insert(id, s.clone());
        Ok(s)
    }

    /// Clears write-side per-stream string state.
    pub fn reset_write(&mut self) {
        self.meta_strings.reset_write();
        if self.dynamic_string_id > 0 {
            self.dynamic_string_to_id.clear();
            self.dynamic_id_to_string.clear();
            self.dynamic_string_id = 0;
        }
    }

    /// Clears read-side per-stream string state.
    pub fn reset_read(&mut self) {
        self.meta_strings.reset_read();
        if self.dynamic_string_id > 0 {
            self.dynamic_string_to_id.clear();
            self.dynamic_id_to_string.clear();
            self.dynamic_string_id = 0;
        }
    }
}

fn legacy_string_hash(s: &str) -> i64 {
    let mut hasher = FnvHasher::default();
    hasher.write(s.as_bytes());
    (hasher.finish() & 0xFFFF_FFFF_FFFF_FF00) as i64
}

fn encode_schema_string(schema: &Schema) -> String {
    match schema {
        Schema::Bool => "bool".to_owned(),
        Schema::Int8 => "i8".to_owned(),
        Schema::Int16 => "i16".to_owned(),
        Schema::Int32 => "i32".to_owned(),
        Schema::Int64 => "i64".to_owned(),
        Schema::Float32 => "f32".to_owned(),
        Schema::Float64 => "f64".to_owned(),
        Schema::String => "string".to_owned(),
        Schema::Binary => "bytes".to_owned(),
        Schema::Date => "date".to_owned(),
        Schema::Timestamp => "timestamp".to_owned(),
        Schema::BoolArray => "[]bool".to_owned(),
        Schema::Int8Array => "[]i8".to_owned(),
        Schema::Int16Array => "[]i16".to_owned(),
        Schema::Int32Array => "[]i32".to_owned(),
        Schema::Int64Array => "[]i64".to_owned(),
        Schema::Float32Array => "[]f32".to_owned(),
        Schema::Float64Array => "[]f64".to_owned(),
        Schema::List(inner) => {
            format!("list[{}]", encode_schema_string(inner))
        }
        Schema::Set(inner) => format!("set[{}]", encode_schema_string(inner)),
        Schema::Map(key, value) => format!(
            "map[{}]{}",
            encode_schema_string(key),
            encode_schema_string(value)
        ),
        Schema::Named(path) => format!("@{path}"),
        Schema::Dynamic => "any".to_owned(),
    }
}

fn parse_schema_string(s: &str) -> Result<Schema> {
    let mut parser = SchemaStringParser { input: s.as_bytes(), pos: 0 };
    let schema = parser.parse()?;
    if parser.pos != parser.input.len() {
        return Err(Error::Malformed("trailing bytes in type string"));
    }
    Ok(schema)
}

struct SchemaStringParser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl SchemaStringParser<'_> {
    fn parse(&mut self) -> Result<Schema> {
        if self.eat("map[") {
            let key = self.parse()?;
            self.expect(']')?;
            let value = self.parse()?;
            return Ok(Schema::Map(Box::new(key), Box::new(value)));
        }
        if self.eat("list[") {
            let inner = self.parse()?;
            self.expect(']')?;
            return Ok(Schema::List(Box::new(inner)));
        }
        if self.eat("set[") {
            let inner = self.parse()?;
            self.expect(']')?;
            return Ok(Schema::Set(Box::new(inner)));
        }
        if self.eat("[]") {
            let element = self.ident();
            return match element {
                "bool" => Ok(Schema::BoolArray),
                "i8" => Ok(Schema::Int8Array),
                "i16" => Ok(Schema::Int16Array),
                "i32" => Ok(Schema::Int32Array),
                "i64" => Ok(Schema::Int64Array),
                "f32" => Ok(Schema::Float32Array),
                "f64" => Ok(Schema::Float64Array),
                _ => Err(Error::Malformed("unknown array element type")),
            };
        }
        if self.eat("@") {
            return Ok(Schema::Named(self.ident().to_owned()));
        }
        match self.ident() {
            "bool" => Ok(Schema::Bool),
            "i8" => Ok(Schema::Int8),
            "i16" => Ok(Schema::Int16),
            "i32" => Ok(Schema::Int32),
            "i64" => Ok(Schema::Int64),
            "f32" => Ok(Schema::Float32),
            "f64" => Ok(Schema::Float64),
            "string" => Ok(Schema::String),
            "bytes" => Ok(Schema::Binary),
            "date" => Ok(Schema::Date),
            "timestamp" => Ok(Schema::Timestamp),
            "any" => Ok(Schema::Dynamic),
            _ => Err(Error::Malformed("unknown type string")),
        }
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.input[self.pos..].starts_with(prefix.as_bytes()) {
            self.pos += prefix.len();
            return true;
        }
        false
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.input.get(self.pos) == Some(&(c as u8)) {
            self.pos += 1;
            return Ok(());
        }
        Err(Error::Malformed("unbalanced type string"))
    }

    /// Consumes up to the next `]` or the end of input.
    fn ident(&mut self) -> &str {
        let start = self.pos;
        while self.pos < self.input.len() && self.input[self.pos] != b']' {
            self.pos += 1;
        }
        std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("")
    }
}
