//! Struct schema codec.
//!
//! A struct payload opens with the fixed 32-bit schema fingerprint, then
//! the fields in wire order (sorted by snake_cased name). Field layout is
//! never self-describing; the fingerprint is what protects both peers from
//! silently disagreeing about it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::resolver::types::TypeId;
use crate::schema::{StructSchema, TypeKey};
use crate::value::{StructValue, Value};

use super::{read_field, write_field, Serializer};

/// Codec for one registered struct type.
pub struct StructSerializer {
    type_id: TypeId,
    key: TypeKey,
    schema: Rc<StructSchema>,
    fingerprint: i32,
}

impl StructSerializer {
    #[must_use]
    pub fn new(type_id: TypeId, key: TypeKey, schema: Rc<StructSchema>) -> Self {
        let fingerprint = schema.fingerprint();
        Self { type_id, key, schema, fingerprint }
    }
}

impl Serializer for StructSerializer {
    fn type_id(&self) -> TypeId { self.type_id }

    fn write(
        &self,
        codec: &mut Codec,
        buf: &mut Buffer,
        value: &Value,
    ) -> Result<()> {
        let Value::Struct(cell) = value else {
            return Err(Error::mismatch("struct", value));
        };
        let instance = cell.borrow();
        if instance.fields.len() != self.schema.fields().len() {
            return Err(Error::SchemaMismatch {
                expected: "a full field list",
                found: "a partial field list",
            });
        }

        buf.write_i32(self.fingerprint);
        for (index, field) in self.schema.sorted_fields() {
            write_field(codec, buf, &field.schema, &instance.fields[index])?;
        }
        Ok(())
    }

    fn read(&self, codec: &mut Codec, buf: &mut Buffer) -> Result<Value> {
        let field_count = self.schema.fields().len();
        let cell = Rc::new(RefCell::new(StructValue::new(
            self.key.clone(),
            vec![Value::Null; field_count],
        )));
        let value = Value::Struct(cell.clone());
        // Self-references through any field must find this instance.
        codec.ref_resolver.reference(value.clone());

        let fingerprint = buf.read_i32()?;
        if fingerprint != self.fingerprint {
            return Err(Error::HashMismatch {
                type_name: self.key.path(),
                expected: self.fingerprint,
                found: fingerprint,
            });
        }
        for (index, field) in self.schema.sorted_fields() {
            let field_value = read_field(codec, buf, &field.schema)?;
            cell.borrow_mut().fields[index] = field_value;
        }
        Ok(value)
    }
}
