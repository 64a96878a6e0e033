//! Homogeneous sequences: fixed-count arrays and length-bound vectors

use crate::constants::MAX_PREALLOCATED_ELEMENTS;
use crate::decoder::{decode_struct, ByteSource};
use crate::error::LayoutError;
use crate::field::Field;
use crate::scalar::{FieldId, Scalar};
use crate::validator::{IntoValidator, SequenceValidator, ValidatorRef};
use crate::value::Value;
use crate::Result;
use bytes::BytesMut;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Items plus the element template they conform to
#[derive(Debug, Clone)]
struct Items {
    element: Box<Field>,
    values: Vec<Value>,
    validator: Option<ValidatorRef>,
}

impl Items {
    fn new(element: Field) -> Self {
        Self {
            element: Box::new(element),
            values: Vec::new(),
            validator: None,
        }
    }

    /// Check one item against the element template and normalize it
    fn check_item(&self, item: Value) -> Result<Value> {
        match &*self.element {
            Field::Placeholder => Ok(item),
            Field::Struct(template) => match item {
                Value::Struct(s) if s.is_a(template.schema()) => Ok(Value::Struct(s)),
                Value::Struct(s) => Err(LayoutError::TypeMismatch {
                    expected: "instance of the element schema",
                    actual: s.schema().name().to_string(),
                }),
                other => Err(LayoutError::TypeMismatch {
                    expected: "struct",
                    actual: other.to_string(),
                }),
            },
            element => {
                let mut slot = element.clone();
                slot.set_value(item)?;
                Ok(slot.value())
            }
        }
    }

    fn check(&self, items: Vec<Value>) -> Result<Vec<Value>> {
        let items = items
            .into_iter()
            .map(|item| self.check_item(item))
            .collect::<Result<Vec<_>>>()?;
        let list = Value::List(items);
        if let Some(validator) = &self.validator {
            validator.validate(&list)?;
        }
        match list {
            Value::List(items) => Ok(items),
            _ => unreachable!("constructed as a list above"),
        }
    }

    fn validate(&self) -> Result<()> {
        self.check(self.values.clone()).map(|_| ())
    }

    fn default_item(&self) -> Value {
        self.element.value()
    }

    fn item_size(&self, item: &Value) -> usize {
        match item {
            Value::Struct(s) => s.size(),
            _ => self.element.size(),
        }
    }

    fn size(&self) -> usize {
        self.values.iter().map(|item| self.item_size(item)).sum()
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        for item in &self.values {
            match item {
                Value::Struct(s) => s.encode_into(buf)?,
                other => {
                    let mut element = (*self.element).clone();
                    element.set_value(other.clone())?;
                    element.encode_into(buf)?;
                }
            }
        }
        Ok(())
    }

    /// Replace the items with `count` elements read from `src`
    fn decode(&mut self, count: usize, src: &mut dyn ByteSource) -> Result<()> {
        let mut values = Vec::with_capacity(count.min(MAX_PREALLOCATED_ELEMENTS));
        match &*self.element {
            Field::Scalar(template) => {
                let width = template.size();
                let span = count
                    .checked_mul(width)
                    .ok_or(LayoutError::IncompleteData {
                        expected: usize::MAX,
                        actual: 0,
                    })?;
                let data = src.take(span)?;
                let mut element = template.clone();
                for chunk in data.chunks_exact(width) {
                    element.decode(chunk)?;
                    values.push(element.value().clone());
                }
            }
            Field::Struct(template) => {
                let schema = template.schema().clone();
                for _ in 0..count {
                    values.push(Value::Struct(decode_struct(&schema, src)?));
                }
            }
            template => {
                for _ in 0..count {
                    let mut element = template.clone();
                    element.decode_from(src)?;
                    values.push(element.value());
                }
            }
        }
        self.values = values;
        Ok(())
    }

    fn set_validator(&mut self, validator: impl IntoValidator) {
        self.validator = Some(Arc::new(SequenceValidator::new(
            validator.into_validator(),
        )));
    }
}

fn into_items(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(LayoutError::TypeMismatch {
            expected: "list",
            actual: other.to_string(),
        }),
    }
}

/// A sequence with a capacity fixed at definition time
///
/// Without fill, an array always holds exactly `capacity` items and starts out
/// as `capacity` copies of the element's default. With fill, shorter
/// assignments are padded with the element's default value.
#[derive(Debug, Clone)]
pub struct Array {
    capacity: usize,
    fill: bool,
    items: Items,
}

impl Array {
    /// `capacity` copies of `element`'s current value
    pub fn new(capacity: usize, element: impl Into<Field>) -> Self {
        let mut items = Items::new(element.into());
        items.values = vec![items.default_item(); capacity];
        Self {
            capacity,
            fill: false,
            items,
        }
    }

    /// Four `u8` octets holding an IPv4 address
    pub fn ipv4(addr: Ipv4Addr) -> Self {
        let mut array = Self::new(4, Scalar::u8(0));
        array.items.values = addr.octets().iter().map(|&o| Value::from(o)).collect();
        array
    }

    /// An IPv4 array from dotted-quad text such as `"10.0.0.1"`
    pub fn parse_ipv4(text: &str) -> Result<Self> {
        let addr = text
            .parse::<Ipv4Addr>()
            .map_err(|_| LayoutError::TypeMismatch {
                expected: "dotted-quad IPv4 address",
                actual: text.to_string(),
            })?;
        Ok(Self::ipv4(addr))
    }

    /// The items as an IPv4 address, if this holds four bytes
    pub fn to_ipv4(&self) -> Option<Ipv4Addr> {
        let octets: Vec<u8> = self
            .items
            .values
            .iter()
            .map(|v| v.as_int().and_then(|i| u8::try_from(i).ok()))
            .collect::<Option<_>>()?;
        let octets: [u8; 4] = octets.try_into().ok()?;
        Some(Ipv4Addr::from(octets))
    }

    /// Pad short assignments with the element default
    pub fn with_fill(mut self) -> Self {
        self.fill = true;
        self
    }

    /// Set the initial items
    pub fn with_value(mut self, value: impl Into<Value>) -> Result<Self> {
        self.set_value(value)?;
        Ok(self)
    }

    /// Validate every element with `validator`
    pub fn with_validator(mut self, validator: impl IntoValidator) -> Self {
        self.items.set_validator(validator);
        self
    }

    /// Fixed item count
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether short assignments are padded
    pub fn is_fill(&self) -> bool {
        self.fill
    }

    /// Current items
    pub fn items(&self) -> &[Value] {
        &self.items.values
    }

    /// The element template
    pub fn element(&self) -> &Field {
        &self.items.element
    }

    pub(crate) fn element_mut(&mut self) -> &mut Field {
        &mut self.items.element
    }

    /// Retype the elements, e.g. from a decode hook
    pub fn set_element(&mut self, element: impl Into<Field>) {
        self.items.element = Box::new(element.into());
    }

    /// The element-wise validator, if any
    pub fn validator(&self) -> Option<&ValidatorRef> {
        self.items.validator.as_ref()
    }

    /// Assign all items
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<()> {
        let items = self.checked(into_items(value.into())?)?;
        self.items.values = items;
        Ok(())
    }

    fn checked(&self, mut items: Vec<Value>) -> Result<Vec<Value>> {
        if items.len() > self.capacity {
            return Err(LayoutError::CapacityExceeded {
                capacity: self.capacity,
                actual: items.len(),
            });
        }
        if items.len() < self.capacity {
            if !self.fill {
                return Err(LayoutError::Underfilled {
                    capacity: self.capacity,
                    actual: items.len(),
                });
            }
            items.resize(self.capacity, self.items.default_item());
        }
        self.items.check(items)
    }

    /// Replace the item at `index`
    pub fn set_item(&mut self, index: usize, item: impl Into<Value>) -> Result<()> {
        let mut items = self.items.values.clone();
        let slot = items.get_mut(index).ok_or(LayoutError::CapacityExceeded {
            capacity: self.capacity,
            actual: index.saturating_add(1),
        })?;
        *slot = item.into();
        self.set_value(items)
    }

    /// Remove the item at `index`; only arrays with fill can shrink, and they re-pad
    pub fn remove(&mut self, index: usize) -> Result<Value> {
        if index >= self.items.values.len() {
            return Err(LayoutError::CapacityExceeded {
                capacity: self.capacity,
                actual: index.saturating_add(1),
            });
        }
        let mut items = self.items.values.clone();
        let removed = items.remove(index);
        self.set_value(items)?;
        Ok(removed)
    }

    /// Check the items against the element template and validator
    pub fn validate(&self) -> Result<()> {
        self.items.validate()
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        let missing = self.capacity.saturating_sub(self.items.values.len());
        self.items.size() + missing * self.items.element.size()
    }

    /// Append the encoding to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        if self.items.values.len() != self.capacity {
            return Err(LayoutError::Underfilled {
                capacity: self.capacity,
                actual: self.items.values.len(),
            });
        }
        self.items.encode_into(buf)
    }

    /// Read `capacity` elements from `src`
    pub fn decode_from(&mut self, src: &mut dyn ByteSource) -> Result<()> {
        self.items.decode(self.capacity, src)
    }
}

/// Where a vector finds its element count
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LengthSource {
    /// The declared scalar with this identity
    Field(FieldId),
    /// The sibling field with this name
    Name(String),
}

impl From<&Scalar> for LengthSource {
    fn from(s: &Scalar) -> Self {
        LengthSource::Field(s.id())
    }
}

impl From<&str> for LengthSource {
    fn from(name: &str) -> Self {
        LengthSource::Name(name.to_string())
    }
}

impl From<String> for LengthSource {
    fn from(name: String) -> Self {
        LengthSource::Name(name)
    }
}

/// A variable-length sequence bound to a sibling length field
///
/// Assigning items pushes the new count into the length field (the owning
/// struct performs the write); decoding reads the count from it.
#[derive(Debug, Clone)]
pub struct Vector {
    length: LengthSource,
    items: Items,
}

impl Vector {
    /// An empty vector whose count is carried by `length`
    pub fn new(length: impl Into<LengthSource>, element: impl Into<Field>) -> Self {
        Self {
            length: length.into(),
            items: Items::new(element.into()),
        }
    }

    /// Set the initial items
    pub fn with_value(mut self, value: impl Into<Value>) -> Result<Self> {
        self.set_value(value)?;
        Ok(self)
    }

    /// Validate every element with `validator`
    pub fn with_validator(mut self, validator: impl IntoValidator) -> Self {
        self.items.set_validator(validator);
        self
    }

    /// The unresolved or resolved length reference
    pub fn length_source(&self) -> &LengthSource {
        &self.length
    }

    /// Name of the length field once bound by a schema
    pub fn length_field(&self) -> Option<&str> {
        match &self.length {
            LengthSource::Name(name) => Some(name),
            LengthSource::Field(_) => None,
        }
    }

    pub(crate) fn bind(&mut self, name: &str) {
        self.length = LengthSource::Name(name.to_string());
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.values.len()
    }

    /// Whether there are no items
    pub fn is_empty(&self) -> bool {
        self.items.values.is_empty()
    }

    /// Current items
    pub fn items(&self) -> &[Value] {
        &self.items.values
    }

    /// The element template
    pub fn element(&self) -> &Field {
        &self.items.element
    }

    pub(crate) fn element_mut(&mut self) -> &mut Field {
        &mut self.items.element
    }

    /// Retype the elements, e.g. from a decode hook
    pub fn set_element(&mut self, element: impl Into<Field>) {
        self.items.element = Box::new(element.into());
    }

    /// The element-wise validator, if any
    pub fn validator(&self) -> Option<&ValidatorRef> {
        self.items.validator.as_ref()
    }

    /// Assign all items
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<()> {
        let items = self.items.check(into_items(value.into())?)?;
        self.items.values = items;
        Ok(())
    }

    /// Append one item
    pub fn push(&mut self, item: impl Into<Value>) -> Result<()> {
        let item = self.items.check_item(item.into())?;
        let mut items = self.items.values.clone();
        items.push(item);
        self.set_value(items)
    }

    /// Remove the item at `index`
    pub fn remove(&mut self, index: usize) -> Result<Value> {
        if index >= self.len() {
            return Err(LayoutError::CapacityExceeded {
                capacity: self.len(),
                actual: index.saturating_add(1),
            });
        }
        let mut items = self.items.values.clone();
        let removed = items.remove(index);
        self.set_value(items)?;
        Ok(removed)
    }

    /// Check the items against the element template and validator
    pub fn validate(&self) -> Result<()> {
        self.items.validate()
    }

    /// Encoded size: the sum of each item's own size
    pub fn size(&self) -> usize {
        self.items.size()
    }

    /// Append the encoding to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        self.items.encode_into(buf)
    }

    /// Replace the items with `count` elements read from `src`
    pub fn decode_items(&mut self, count: usize, src: &mut dyn ByteSource) -> Result<()> {
        self.items.decode(count, src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::SliceSource;
    use crate::endianness::Endianness;

    #[test]
    fn test_array_fill_pads_with_element_default() {
        let mut a = Array::new(3, Scalar::u8(3)).with_fill();
        a.set_value(vec![1u8, 2]).unwrap();
        assert_eq!(a.items(), &[Value::Int(1), Value::Int(2), Value::Int(3)]);

        a.set_value(vec![4u8]).unwrap();
        let mut buf = BytesMut::new();
        a.encode_into(&mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[4, 3, 3]);
    }

    #[test]
    fn test_array_capacity() {
        let mut a = Array::new(3, Scalar::u8(0));
        assert_eq!(a.items().len(), 3);
        assert!(matches!(
            a.set_value(vec![1u8, 2, 3, 4]),
            Err(LayoutError::CapacityExceeded {
                capacity: 3,
                actual: 4
            })
        ));
        assert!(matches!(
            a.set_value(vec![1u8]),
            Err(LayoutError::Underfilled { .. })
        ));
        assert!(a.remove(0).is_err());
        // Failed assignments leave the array untouched
        assert_eq!(a.items(), &[const { Value::Int(0) }; 3]);
    }

    #[test]
    fn test_array_remove_repads() {
        let mut a = Array::new(3, Scalar::u8(9))
            .with_fill()
            .with_value(vec![1u8, 2, 3])
            .unwrap();
        assert_eq!(a.remove(0).unwrap(), Value::Int(1));
        assert_eq!(a.items(), &[Value::Int(2), Value::Int(3), Value::Int(9)]);
    }

    #[test]
    fn test_array_element_validator() {
        let ok = Array::new(3, Scalar::u8(8)).with_fill().with_validator(
            crate::validator::FunctionValidator::new("gt7", |v| v.as_int().is_some_and(|x| x > 7)),
        );
        assert!(ok.validate().is_ok());

        let bad = Array::new(3, Scalar::u8(8)).with_fill().with_validator(
            crate::validator::FunctionValidator::new("gt9", |v| v.as_int().is_some_and(|x| x > 9)),
        );
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_ipv4_array() {
        let mut a = Array::parse_ipv4("192.168.1.20").unwrap();
        assert_eq!(a.capacity(), 4);
        assert_eq!(a.to_ipv4(), Some(Ipv4Addr::new(192, 168, 1, 20)));
        let mut buf = BytesMut::new();
        a.encode_into(&mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[192, 168, 1, 20]);

        a.set_value(Ipv4Addr::LOCALHOST).unwrap();
        assert_eq!(a.to_ipv4().unwrap().to_string(), "127.0.0.1");

        assert!(Array::parse_ipv4("10.0.0").is_err());
        assert!(Array::parse_ipv4("10.0.0.256").is_err());
        assert!(a.set_value(vec![1u8, 2, 3]).is_err());
    }

    #[test]
    fn test_struct_items_must_match_element_schema() {
        let point = crate::schema::Schema::builder("Point")
            .field("x", Scalar::u8(0))
            .build()
            .unwrap();
        let other = crate::schema::Schema::builder("Other")
            .field("x", Scalar::u8(0))
            .build()
            .unwrap();
        let mut v = Vector::new("len", point.instance());
        v.push(point.instance()).unwrap();
        assert!(matches!(
            v.push(other.instance()),
            Err(LayoutError::TypeMismatch { .. })
        ));
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn test_index_errors_do_not_overflow() {
        let mut a = Array::new(2, Scalar::u8(0));
        assert!(matches!(
            a.set_item(usize::MAX, 1u8),
            Err(LayoutError::CapacityExceeded {
                actual: usize::MAX,
                ..
            })
        ));
        let mut v = Vector::new("len", Scalar::u8(0));
        assert!(matches!(
            v.remove(usize::MAX),
            Err(LayoutError::CapacityExceeded {
                actual: usize::MAX,
                ..
            })
        ));
    }

    #[test]
    fn test_vector_items_checked_against_element() {
        let mut v = Vector::new("len", Scalar::u8(0));
        assert!(v.set_value(vec![1u16, 300]).is_err());
        assert!(v.is_empty());
        v.push(7u8).unwrap();
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn test_vector_size_sums_items() {
        let v = Vector::new("len", Scalar::i32(0))
            .with_value(vec![9i32, 10, 100])
            .unwrap();
        assert_eq!(v.size(), 12);
    }

    #[test]
    fn test_vector_decode_items() {
        let mut v = Vector::new("len", Scalar::u16(0).with_endianness(Endianness::Big));
        let data = [0x00, 0x01, 0x01, 0x00, 0xAA];
        let mut src = SliceSource::new(&data);
        v.decode_items(2, &mut src).unwrap();
        assert_eq!(v.items(), &[Value::Int(1), Value::Int(256)]);
        assert_eq!(src.consumed(), 4);

        let mut src = SliceSource::new(&data);
        assert!(matches!(
            v.decode_items(3, &mut src),
            Err(LayoutError::IncompleteData { .. })
        ));
    }

    #[test]
    fn test_length_source_from_scalar_identity() {
        let len = Scalar::u8(0);
        let v = Vector::new(&len, Scalar::u8(0));
        assert_eq!(v.length_source(), &LengthSource::Field(len.id()));
        assert_eq!(v.length_field(), None);
    }
}
