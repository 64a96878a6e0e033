//! The field sum type
//!
//! A [`Field`] is the unit of byte-level encoding. Every slot of a struct
//! holds one, and a slot may be replaced wholesale (for example a
//! [`Field::Placeholder`] retyped by a decode hook).

use crate::decoder::{decode_struct, ByteSource, SliceSource};
use crate::endianness::Endianness;
use crate::error::LayoutError;
use crate::meta::MetaField;
use crate::scalar::{EnumField, Scalar};
use crate::sequence::{Array, Vector};
use crate::structure::Struct;
use crate::validator::ValidatorRef;
use crate::value::Value;
use crate::Result;
use bytes::{Bytes, BytesMut};

/// A field of a struct
#[derive(Debug, Clone)]
pub enum Field {
    /// Fixed-width number
    Scalar(Scalar),
    /// Integer restricted to named values
    Enum(EnumField),
    /// Fixed-count sequence
    Array(Array),
    /// Sequence whose count lives in a sibling length field
    Vector(Vector),
    /// Zero-size slot awaiting a concrete field
    Placeholder,
    /// Field derived from the surrounding message
    Meta(MetaField),
    /// Nested struct instance
    Struct(Struct),
}

impl Field {
    /// A placeholder slot
    pub fn placeholder() -> Self {
        Field::Placeholder
    }

    /// Short description of the variant
    pub fn kind_name(&self) -> &'static str {
        match self {
            Field::Scalar(s) => s.kind().name(),
            Field::Enum(_) => "enum",
            Field::Array(_) => "array",
            Field::Vector(_) => "vector",
            Field::Placeholder => "placeholder",
            Field::Meta(_) => "meta",
            Field::Struct(_) => "struct",
        }
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        match self {
            Field::Scalar(s) => s.size(),
            Field::Enum(e) => e.size(),
            Field::Array(a) => a.size(),
            Field::Vector(v) => v.size(),
            Field::Placeholder => 0,
            Field::Meta(m) => m.size(),
            Field::Struct(s) => s.size(),
        }
    }

    /// Current value
    pub fn value(&self) -> Value {
        match self {
            Field::Scalar(s) => s.value().clone(),
            Field::Enum(e) => e.value().clone(),
            Field::Array(a) => Value::List(a.items().to_vec()),
            Field::Vector(v) => Value::List(v.items().to_vec()),
            Field::Placeholder => Value::Empty,
            Field::Meta(m) => m.value(),
            Field::Struct(s) => Value::Struct(s.clone()),
        }
    }

    /// Assign a value, checking the format and any validator first
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match self {
            Field::Scalar(s) => s.set_value(value),
            Field::Enum(e) => e.set_value(value),
            Field::Array(a) => a.set_value(value),
            Field::Vector(v) => v.set_value(value),
            Field::Placeholder => Err(LayoutError::Placeholder),
            Field::Meta(m) => m.set_value(value),
            Field::Struct(s) => match value {
                Value::Struct(new) => {
                    *s = new;
                    Ok(())
                }
                other => Err(LayoutError::TypeMismatch {
                    expected: "struct",
                    actual: other.to_string(),
                }),
            },
        }
    }

    /// The attached validator, if any
    pub fn validator(&self) -> Option<&ValidatorRef> {
        match self {
            Field::Scalar(s) => s.validator(),
            Field::Enum(e) => e.scalar().validator(),
            Field::Array(a) => a.validator(),
            Field::Vector(v) => v.validator(),
            Field::Meta(m) => m.backing().validator(),
            Field::Placeholder | Field::Struct(_) => None,
        }
    }

    /// Re-check the current value against the field's constraints
    pub fn validate(&self) -> Result<()> {
        match self {
            Field::Scalar(s) => s.validate(),
            Field::Enum(e) => e.validate(),
            Field::Array(a) => a.validate(),
            Field::Vector(v) => v.validate(),
            Field::Placeholder => Ok(()),
            Field::Meta(m) => m.backing().validate(),
            Field::Struct(s) => s.validate(),
        }
    }

    /// Append the encoding to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Field::Scalar(s) => s.encode_into(buf),
            Field::Enum(e) => e.encode_into(buf),
            Field::Array(a) => a.encode_into(buf),
            Field::Vector(v) => v.encode_into(buf),
            Field::Placeholder => Err(LayoutError::Placeholder),
            Field::Meta(m) => m.backing().encode_into(buf),
            Field::Struct(s) => s.encode_into(buf),
        }
    }

    /// Encode to a fresh buffer
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.size());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Replace the value with one read from `src`.
    ///
    /// A vector consumes as many items as it currently holds; inside a struct
    /// the count comes from the bound length field instead.
    pub fn decode_from(&mut self, src: &mut dyn ByteSource) -> Result<()> {
        match self {
            Field::Scalar(s) => {
                let data = src.take(s.size())?;
                s.decode(&data)
            }
            Field::Enum(e) => {
                let data = src.take(e.size())?;
                e.decode(&data)
            }
            Field::Array(a) => a.decode_from(src),
            Field::Vector(v) => {
                let count = v.len();
                v.decode_items(count, src)
            }
            Field::Placeholder => Err(LayoutError::Placeholder),
            Field::Meta(m) => m.backing_mut().decode_from(src),
            Field::Struct(s) => {
                let schema = s.schema().clone();
                *s = decode_struct(&schema, src)?;
                Ok(())
            }
        }
    }

    /// Decode from the front of `data`; trailing bytes are ignored
    pub fn decode(&mut self, data: &[u8]) -> Result<()> {
        let mut src = SliceSource::new(data);
        self.decode_from(&mut src)
    }

    /// Give every unset scalar inside this field the schema default
    pub(crate) fn inherit_endianness(&mut self, endianness: Endianness) {
        match self {
            Field::Scalar(s) => {
                s.inherit_endianness(endianness);
            }
            Field::Enum(e) => {
                e.scalar_mut().inherit_endianness(endianness);
            }
            Field::Array(a) => a.element_mut().inherit_endianness(endianness),
            Field::Vector(v) => v.element_mut().inherit_endianness(endianness),
            Field::Meta(m) => m.backing_mut().inherit_endianness(endianness),
            Field::Placeholder | Field::Struct(_) => {}
        }
    }

    /// The scalar, if this is one
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Field::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The enum, if this is one
    pub fn as_enum(&self) -> Option<&EnumField> {
        match self {
            Field::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// The array, if this is one
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Field::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The vector, if this is one
    pub fn as_vector(&self) -> Option<&Vector> {
        match self {
            Field::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// The meta-field, if this is one
    pub fn as_meta(&self) -> Option<&MetaField> {
        match self {
            Field::Meta(m) => Some(m),
            _ => None,
        }
    }

    /// The nested struct, if this is one
    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Field::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this slot still awaits a concrete field
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Field::Placeholder)
    }
}

/// Fields are equal when they hold equal values and encode to the same length
impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.size() == other.size() && self.value() == other.value()
    }
}

impl From<Scalar> for Field {
    fn from(s: Scalar) -> Self {
        Field::Scalar(s)
    }
}

impl From<EnumField> for Field {
    fn from(e: EnumField) -> Self {
        Field::Enum(e)
    }
}

impl From<Array> for Field {
    fn from(a: Array) -> Self {
        Field::Array(a)
    }
}

impl From<Vector> for Field {
    fn from(v: Vector) -> Self {
        Field::Vector(v)
    }
}

impl From<MetaField> for Field {
    fn from(m: MetaField) -> Self {
        Field::Meta(m)
    }
}

impl From<Struct> for Field {
    fn from(s: Struct) -> Self {
        Field::Struct(s)
    }
}
