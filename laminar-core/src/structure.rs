//! Struct instances
//!
//! A [`Struct`] is one value of a [`Schema`]: an owned copy of every template
//! field. The set of fields is frozen by the schema; values change only
//! through the methods here, which validate before committing and keep
//! vector length fields in step with their vectors.

use crate::error::LayoutError;
use crate::field::Field;
use crate::schema::Schema;
use crate::sequence::{LengthSource, Vector};
use crate::value::Value;
use crate::Result;
use bytes::{Bytes, BytesMut};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a struct instance; clones get a new one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        InstanceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// An instance of a schema
pub struct Struct {
    schema: Arc<Schema>,
    fields: Vec<Field>,
    id: InstanceId,
}

impl Struct {
    pub(crate) fn from_template(schema: Arc<Schema>, fields: Vec<Field>) -> Self {
        Self {
            schema,
            fields,
            id: InstanceId::next(),
        }
    }

    /// Copy that keeps this instance's identity
    pub(crate) fn snapshot(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            fields: self.fields.clone(),
            id: self.id,
        }
    }

    /// The schema this is an instance of
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Identity of this instance
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Whether this is an instance of `schema` or of a schema extending it
    pub fn is_a(&self, schema: &Schema) -> bool {
        self.schema.is_a(schema)
    }

    fn index(&self, name: &str) -> Result<usize> {
        self.schema
            .index_of(name)
            .ok_or_else(|| LayoutError::UnknownField {
                schema: self.schema.name().to_string(),
                field: name.to_string(),
            })
    }

    /// The named field
    pub fn field(&self, name: &str) -> Result<&Field> {
        Ok(&self.fields[self.index(name)?])
    }

    /// Value of the named field
    pub fn get(&self, name: &str) -> Result<Value> {
        self.field(name).map(Field::value)
    }

    /// Value of the named field, which must hold an integer
    pub fn get_int(&self, name: &str) -> Result<i128> {
        let value = self.get(name)?;
        value.as_int().ok_or_else(|| {
            LayoutError::TypeMismatch {
                expected: "integer",
                actual: value.to_string(),
            }
            .in_field(name)
        })
    }

    /// Fields in table order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.schema.field_names().zip(self.fields.iter())
    }

    pub(crate) fn field_at(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    pub(crate) fn field_at_mut(&mut self, index: usize) -> &mut Field {
        &mut self.fields[index]
    }

    /// Assign a value to the named field.
    ///
    /// Nothing is committed unless the value passes the field's checks; for
    /// a vector the bound length field is rewritten with the new count.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.index(name)?;
        let mut candidate = self.fields[index].clone();
        candidate
            .set_value(value)
            .map_err(|e| e.in_field(name))?;
        self.commit(index, candidate)
    }

    /// Assign several fields; on error none of them change
    pub fn update<I, K, V>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let backup = self.fields.clone();
        for (name, value) in values {
            if let Err(e) = self.set(name.as_ref(), value) {
                self.fields = backup;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Append one item to the named vector
    pub fn push(&mut self, name: &str, item: impl Into<Value>) -> Result<()> {
        let index = self.index(name)?;
        let mut candidate = match &self.fields[index] {
            Field::Vector(v) => v.clone(),
            _ => return Err(LayoutError::NotASequence(name.to_string())),
        };
        candidate.push(item).map_err(|e| e.in_field(name))?;
        self.commit(index, Field::Vector(candidate))
    }

    /// Replace the named field wholesale, e.g. retyping a placeholder from a
    /// decode hook. Decode hooks stay attached to the slot.
    pub fn set_field(&mut self, name: &str, field: impl Into<Field>) -> Result<()> {
        let index = self.index(name)?;
        let mut field = field.into();
        if let Some(endianness) = self.schema.endianness() {
            field.inherit_endianness(endianness);
        }
        if let Field::Vector(v) = &mut field {
            let length_index = self.resolve_length(v.length_source()).ok_or_else(|| {
                LayoutError::UnresolvedLengthField {
                    schema: self.schema.name().to_string(),
                    field: name.to_string(),
                }
            })?;
            v.bind(self.schema.field_name(length_index));
        }
        field.validate().map_err(|e| e.in_field(name))?;
        self.commit(index, field)
    }

    /// Retype the element template of the named array or vector
    pub fn set_element_type(&mut self, name: &str, element: impl Into<Field>) -> Result<()> {
        let index = self.index(name)?;
        let mut element = element.into();
        if let Some(endianness) = self.schema.endianness() {
            element.inherit_endianness(endianness);
        }
        match &mut self.fields[index] {
            Field::Array(a) => a.set_element(element),
            Field::Vector(v) => v.set_element(element),
            _ => return Err(LayoutError::NotASequence(name.to_string())),
        }
        Ok(())
    }

    /// Store a checked field, syncing the length field first if it is a vector
    fn commit(&mut self, index: usize, field: Field) -> Result<()> {
        if let Field::Vector(v) = &field {
            let length_index = self.length_index(v)?;
            let mut length = self.fields[length_index].clone();
            length
                .set_value(v.len())
                .map_err(|e| e.in_field(self.schema.field_name(length_index)))?;
            self.fields[length_index] = length;
        }
        self.fields[index] = field;
        Ok(())
    }

    pub(crate) fn resolve_length(&self, source: &LengthSource) -> Option<usize> {
        match source {
            LengthSource::Name(name) => self.schema.index_of(name),
            LengthSource::Field(id) => self
                .fields
                .iter()
                .position(|f| f.as_scalar().is_some_and(|s| s.id() == *id)),
        }
    }

    fn length_index(&self, vector: &Vector) -> Result<usize> {
        self.resolve_length(vector.length_source())
            .ok_or_else(|| LayoutError::UnresolvedLengthField {
                schema: self.schema.name().to_string(),
                field: format!("{:?}", vector.length_source()),
            })
    }

    /// Element count announced by the length field bound to `vector`
    pub(crate) fn length_of(&self, vector: &Vector) -> Result<usize> {
        let index = self.length_index(vector)?;
        let value = self.fields[index].value();
        let count = value.as_int().ok_or_else(|| LayoutError::TypeMismatch {
            expected: "integer",
            actual: value.to_string(),
        })?;
        usize::try_from(count).map_err(|_| LayoutError::OutOfRange {
            value: count.to_string(),
            kind: "usize",
        })
    }

    /// Re-run every field's checks
    pub fn validate(&self) -> Result<()> {
        for (name, field) in self.iter() {
            field.validate().map_err(|e| e.in_field(name))?;
        }
        Ok(())
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        self.fields.iter().map(Field::size).sum()
    }

    /// Append the encoding to `buf`, running the schema's encode hooks around it
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        for hook in self.schema.pre_encode_hooks() {
            hook(self)?;
        }
        let start = buf.len();
        for (name, field) in self.iter() {
            field.encode_into(buf).map_err(|e| e.in_field(name))?;
        }
        for hook in self.schema.post_encode_hooks() {
            hook(self, &buf[start..])?;
        }
        Ok(())
    }

    /// Encode to a fresh buffer
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.size());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Encoding of the fields before `end`
    pub(crate) fn encode_prefix(&self, end: usize, buf: &mut BytesMut) -> Result<()> {
        for (name, field) in self.iter().take(end) {
            field.encode_into(buf).map_err(|e| e.in_field(name))?;
        }
        Ok(())
    }
}

impl Clone for Struct {
    fn clone(&self) -> Self {
        Self::from_template(Arc::clone(&self.schema), self.fields.clone())
    }
}

impl fmt::Debug for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.schema.name());
        for (name, field) in self.iter() {
            out.field(name, &field.value());
        }
        out.finish()
    }
}

impl fmt::Display for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.schema.name())?;
        for (i, (name, field)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, field.value())?;
        }
        write!(f, ")")
    }
}

/// Instances are equal when their fields are pairwise equal, whatever their schema
impl PartialEq for Struct {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self.fields.iter().zip(&other.fields).all(|(a, b)| a == b)
    }
}

impl Serialize for Struct {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, field) in self.iter() {
            map.serialize_entry(name, &field.value())?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endianness::Endianness;
    use crate::scalar::Scalar;
    use crate::sequence::Array;

    fn lv() -> Arc<Schema> {
        Schema::builder("Lv")
            .endianness(Endianness::Big)
            .field("len", Scalar::u16(0))
            .field("data", Vector::new("len", Scalar::u8(0)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_instances_do_not_alias() {
        let schema = lv();
        let mut a = schema.instance();
        let b = schema.instance();
        a.set("data", vec![1u8, 2]).unwrap();
        assert_eq!(a.get_int("len").unwrap(), 2);
        assert_eq!(b.get_int("len").unwrap(), 0);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_vector_mutation_syncs_length() {
        let mut s = lv().instance();
        s.set("data", vec![7u8, 8, 9]).unwrap();
        s.push("data", 10u8).unwrap();
        assert_eq!(s.get_int("len").unwrap(), 4);
        assert_eq!(s.encode().unwrap().as_ref(), &[0, 4, 7, 8, 9, 10]);
    }

    #[test]
    fn test_failed_set_commits_nothing() {
        let mut s = lv().instance();
        s.set("data", vec![1u8]).unwrap();
        let err = s.set("data", vec![1u16, 999]).unwrap_err();
        assert!(matches!(err, LayoutError::Field { ref field, .. } if field == "data"));
        assert_eq!(s.get("data").unwrap(), Value::from(vec![1u8]));
        assert_eq!(s.get_int("len").unwrap(), 1);
    }

    #[test]
    fn test_length_overflow_is_rejected() {
        let schema = Schema::builder("Tiny")
            .field("len", Scalar::u8(0))
            .field("data", Vector::new("len", Scalar::u8(0)))
            .build()
            .unwrap();
        let mut s = schema.instance();
        assert!(s.set("data", vec![0u8; 256]).is_err());
        assert_eq!(s.get_int("len").unwrap(), 0);
    }

    #[test]
    fn test_unknown_field_is_usage_error() {
        let mut s = lv().instance();
        let err = s.set("lenght", 1).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Usage);
        assert!(s.get("nope").is_err());
        assert!(matches!(
            s.push("len", 1),
            Err(LayoutError::NotASequence(_))
        ));
    }

    #[test]
    fn test_update_is_atomic() {
        let schema = Schema::builder("Pair")
            .field("a", Scalar::u8(0))
            .field("b", Scalar::u8(0))
            .build()
            .unwrap();
        let mut s = schema.instance();
        assert!(s.update([("a", 1), ("b", 300)]).is_err());
        assert_eq!(s.get_int("a").unwrap(), 0);
        s.update([("a", 1), ("b", 2)]).unwrap();
        assert_eq!(s.encode().unwrap().as_ref(), &[1, 2]);
    }

    #[test]
    fn test_clone_is_deep_with_new_identity() {
        let mut a = lv().instance();
        a.set("data", vec![1u8]).unwrap();
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_equality_across_schemas() {
        let one = Schema::builder("One")
            .field("x", Scalar::u8(5))
            .build()
            .unwrap();
        let two = Schema::builder("Two")
            .field("y", Scalar::u8(5))
            .build()
            .unwrap();
        assert_eq!(one.instance(), two.instance());
    }

    #[test]
    fn test_set_field_inherits_schema_endianness() {
        let schema = Schema::builder("Retype")
            .endianness(Endianness::Big)
            .field("x", Field::placeholder())
            .build()
            .unwrap();
        let mut s = schema.instance();
        s.set_field("x", Scalar::u16(1)).unwrap();
        assert_eq!(s.encode().unwrap().as_ref(), &[0, 1]);
    }

    #[test]
    fn test_set_element_type() {
        let schema = Schema::builder("Arr")
            .field("items", Array::new(2, Scalar::u8(0)))
            .build()
            .unwrap();
        let mut s = schema.instance();
        s.set_element_type("items", Scalar::u16(0)).unwrap();
        assert_eq!(s.size(), 4);
        assert!(s.set_element_type("nope", Scalar::u8(0)).is_err());
    }

    #[test]
    fn test_display() {
        let mut s = lv().instance();
        s.set("data", vec![1u8, 2]).unwrap();
        assert_eq!(s.to_string(), "Lv(len=2, data=[1, 2])");
    }
}
