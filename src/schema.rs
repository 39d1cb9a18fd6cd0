//! Explicit type shapes.
//!
//! Instead of introspecting host types at runtime, callers register a
//! [`StructSchema`] per struct type. A schema is a plain value the codec
//! walks when writing or reading fields, and it doubles as the input of the
//! schema fingerprint both peers verify before trusting field layout.

use crate::hash::string_hash_31;
use crate::resolver::types;

/// Identifies a registered type: either a user-reserved numeric id or a
/// `(namespace, name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// Registered through `register_type_id`.
    Id(u16),
    /// Registered through `register_named_type`.
    Named {
        namespace: String,
        name: String,
    },
}

impl TypeKey {
    /// Builds a named key from a dotted path; everything before the last
    /// dot is the namespace.
    #[must_use]
    pub fn named(path: &str) -> Self {
        match path.rsplit_once('.') {
            Some((namespace, name)) => Self::Named {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            },
            None => Self::Named {
                namespace: String::new(),
                name: path.to_owned(),
            },
        }
    }

    /// The dotted form used by [`Schema::Named`] references.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Id(id) => format!("#{id}"),
            Self::Named { namespace, name } if namespace.is_empty() => {
                name.clone()
            }
            Self::Named { namespace, name } => format!("{namespace}.{name}"),
        }
    }
}

/// The declared shape of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Schema {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Binary,
    Date,
    Timestamp,
    BoolArray,
    Int8Array,
    Int16Array,
    Int32Array,
    Int64Array,
    Float32Array,
    Float64Array,
    List(Box<Schema>),
    Set(Box<Schema>),
    Map(Box<Schema>, Box<Schema>),
    /// A reference to another registered type by its dotted path. The
    /// referenced type may be registered after the referring one, so
    /// self-referential and mutually recursive schemas work.
    Named(String),
    /// Any value; the wire carries full type information per occurrence.
    Dynamic,
}

impl Schema {
    /// The wire type id of a concrete schema.
    ///
    /// [`Schema::Named`] and [`Schema::Dynamic`] have no single id and are
    /// handled by their callers.
    #[must_use]
    pub fn type_id(&self) -> types::TypeId {
        match self {
            Self::Bool => types::BOOL,
            Self::Int8 => types::INT8,
            Self::Int16 => types::INT16,
            Self::Int32 => types::INT32,
            Self::Int64 => types::INT64,
            Self::Float32 => types::FLOAT32,
            Self::Float64 => types::FLOAT64,
            Self::String => types::STRING,
            Self::Binary => types::BINARY,
            Self::Date => types::LOCAL_DATE,
            Self::Timestamp => types::TIMESTAMP,
            Self::BoolArray => types::BOOL_ARRAY,
            Self::Int8Array => types::INT8_ARRAY,
            Self::Int16Array => types::INT16_ARRAY,
            Self::Int32Array => types::INT32_ARRAY,
            Self::Int64Array => types::INT64_ARRAY,
            Self::Float32Array => types::FLOAT32_ARRAY,
            Self::Float64Array => types::FLOAT64_ARRAY,
            Self::List(_) => types::LIST,
            Self::Set(_) => types::SET,
            Self::Map(..) => types::MAP,
            Self::Named(_) | Self::Dynamic => types::NA,
        }
    }

    /// Whether values of this shape go through the null/reference protocol.
    ///
    /// Heap-backed and dynamic slots can be absent or shared; bare
    /// primitives cannot.
    #[must_use]
    pub fn referencable(&self) -> bool {
        !matches!(
            self,
            Self::Bool
                | Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Float32
                | Self::Float64
                | Self::Date
                | Self::Timestamp
        )
    }
}

/// One declared struct field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self { name: name.into(), schema }
    }
}

/// The declared field list of a struct type.
///
/// Fields keep their declaration order for host access; the wire writes
/// them sorted by snake_cased name, so declaration order never leaks into
/// the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructSchema {
    fields: Vec<Field>,
    sorted: Vec<usize>,
}

impl StructSchema {
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        let mut sorted: Vec<usize> = (0..fields.len()).collect();
        sorted.sort_by_key(|&i| snake_case(&fields[i].name));
        Self { fields, sorted }
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Field] { &self.fields }

    /// Fields in wire order, each with its declaration index.
    pub fn sorted_fields(&self) -> impl Iterator<Item = (usize, &Field)> {
        self.sorted.iter().map(move |&i| (i, &self.fields[i]))
    }

    /// Declaration index of a field by name.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// A 31-bit fingerprint of the field layout.
    ///
    /// Chains the wire type ids of the fields in wire order through a
    /// `hash * 31 + id` mix, collapsing by `/ 7` while the running value
    /// reaches the 31-bit ceiling. Named fields contribute the hash of
    /// their registration path instead of recursing, so self-referential
    /// schemas terminate; dynamic fields contribute nothing.
    #[must_use]
    pub fn fingerprint(&self) -> i32 {
        let mut hash: i64 = 17;
        for (_, field) in self.sorted_fields() {
            let id = match &field.schema {
                Schema::Dynamic => continue,
                Schema::Named(path) => i64::from(string_hash_31(path)),
                other => i64::from(other.type_id()),
            };
            hash = hash.wrapping_mul(31).wrapping_add(id);
            while hash >= i64::from(i32::MAX) {
                hash /= 7;
            }
        }
        hash as i32
    }
}

/// Lowers `CamelCase` and `mixedCase` names to `snake_case`.
#[must_use]
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod test;
