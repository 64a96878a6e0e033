//! Meta-fields: fields whose value is derived from the enclosing message
//!
//! A [`MetaField`] wraps a concrete backing field (usually an integer scalar)
//! and knows how to recompute its value from the layers of a [`Message`].
//! Recomputation happens in [`Message`] after every structural change; on its
//! own a meta-field encodes and decodes exactly like its backing field.
//!
//! | Kind | Value |
//! |------|-------|
//! | [`MetaKind::InclusiveLength`] | bytes of the owning layer and everything after it |
//! | [`MetaKind::ExclusiveLength`] | bytes of everything after the owning layer |
//! | [`MetaKind::Opcode`] | code of the next layer's schema, unchanged when there is none |
//! | [`MetaKind::Checksum`] | CRC32C of every message byte before the field |
//! | [`MetaKind::Custom`] | whatever a [`MetaCompute`] implementation returns |

use crate::error::LayoutError;
use crate::field::Field;
use crate::message::{Layer, Message};
use crate::schema::Schema;
use crate::structure::Struct;
use crate::value::Value;
use crate::Result;
use bytes::BytesMut;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Position of a meta-field inside a message during recomputation
#[derive(Debug, Clone, Copy)]
pub struct MetaContext<'a> {
    message: &'a Message,
    layer_index: usize,
    field_index: usize,
}

impl<'a> MetaContext<'a> {
    pub(crate) fn new(message: &'a Message, layer_index: usize, field_index: usize) -> Self {
        Self {
            message,
            layer_index,
            field_index,
        }
    }

    /// The whole message
    pub fn message(&self) -> &'a Message {
        self.message
    }

    /// Index of the layer that owns the field
    pub fn layer_index(&self) -> usize {
        self.layer_index
    }

    /// Index of the field inside its layer
    pub fn field_index(&self) -> usize {
        self.field_index
    }

    /// The layer that owns the field
    pub fn layer(&self) -> Option<&'a Struct> {
        self.message.layers().get(self.layer_index)?.as_struct()
    }

    /// The layer right after the owning one
    pub fn next_layer(&self) -> Option<&'a Layer> {
        self.message.layers().get(self.layer_index + 1)
    }

    /// Encoded size of the layers from `start` to the end
    pub fn size_from(&self, start: usize) -> usize {
        self.message
            .layers()
            .iter()
            .skip(start)
            .map(Layer::size)
            .sum()
    }

    /// Encoding of every message byte that precedes the field
    pub fn preceding_bytes(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::new();
        for layer in self.message.layers().iter().take(self.layer_index) {
            layer.encode_into(&mut buf)?;
        }
        if let Some(layer) = self.layer() {
            layer.encode_prefix(self.field_index, &mut buf)?;
        }
        Ok(buf)
    }
}

/// User-defined derivation of a meta-field value
pub trait MetaCompute: Send + Sync + fmt::Debug {
    /// The value the field should hold, or `None` to leave it unchanged
    fn compute(&self, ctx: &MetaContext<'_>) -> Result<Option<Value>>;
}

/// Bidirectional map between schemas and the opcodes that announce them
///
/// Lookups by schema match the exact schema, not schemas extending it.
#[derive(Debug, Clone)]
pub struct OpcodeTable {
    entries: Arc<[(Arc<Schema>, i128)]>,
    by_code: Arc<HashMap<i128, usize>>,
}

impl OpcodeTable {
    /// Build the table, rejecting repeated codes and repeated schemas
    pub fn new(entries: impl IntoIterator<Item = (Arc<Schema>, i128)>) -> Result<Self> {
        let entries: Vec<(Arc<Schema>, i128)> = entries.into_iter().collect();
        let mut by_code = HashMap::with_capacity(entries.len());
        for (index, (schema, code)) in entries.iter().enumerate() {
            if by_code.insert(*code, index).is_some() {
                return Err(LayoutError::DuplicateOpcode(*code));
            }
            if entries[..index].iter().any(|(s, _)| Arc::ptr_eq(s, schema)) {
                return Err(LayoutError::DuplicateOpcodeSchema(schema.name().to_string()));
            }
        }
        Ok(Self {
            entries: entries.into(),
            by_code: Arc::new(by_code),
        })
    }

    /// Code announcing `schema`
    pub fn code_for(&self, schema: &Arc<Schema>) -> Option<i128> {
        self.entries
            .iter()
            .find(|(s, _)| Arc::ptr_eq(s, schema))
            .map(|(_, code)| *code)
    }

    /// Schema announced by `code`
    pub fn schema_for(&self, code: i128) -> Option<&Arc<Schema>> {
        self.by_code.get(&code).map(|&i| &self.entries[i].0)
    }

    /// Entries in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<Schema>, i128)> {
        self.entries.iter().map(|(s, c)| (s, *c))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How a meta-field derives its value
#[derive(Debug, Clone)]
pub enum MetaKind {
    /// Size of the owning layer and all following layers
    InclusiveLength,
    /// Size of all following layers
    ExclusiveLength,
    /// Code of the next layer's schema
    Opcode(OpcodeTable),
    /// CRC32C of the message bytes before the field
    Checksum,
    /// User-defined derivation
    Custom(Arc<dyn MetaCompute>),
}

/// A field derived from the message around it
#[derive(Debug, Clone)]
pub struct MetaField {
    kind: MetaKind,
    data: Box<Field>,
}

impl MetaField {
    fn with_kind(kind: MetaKind, backing: impl Into<Field>) -> Self {
        Self {
            kind,
            data: Box::new(backing.into()),
        }
    }

    /// Length of the owning layer plus everything after it
    pub fn inclusive_length(backing: impl Into<Field>) -> Self {
        Self::with_kind(MetaKind::InclusiveLength, backing)
    }

    /// Length of everything after the owning layer
    pub fn exclusive_length(backing: impl Into<Field>) -> Self {
        Self::with_kind(MetaKind::ExclusiveLength, backing)
    }

    /// Code of the next layer's schema; every code must fit `backing`
    pub fn opcode(backing: impl Into<Field>, table: OpcodeTable) -> Result<Self> {
        let backing = backing.into();
        for (_, code) in table.iter() {
            backing.clone().set_value(code)?;
        }
        Ok(Self::with_kind(MetaKind::Opcode(table), backing))
    }

    /// CRC32C of every message byte before this field
    pub fn checksum(backing: impl Into<Field>) -> Self {
        Self::with_kind(MetaKind::Checksum, backing)
    }

    /// Derived by a user-supplied [`MetaCompute`]
    pub fn custom(backing: impl Into<Field>, compute: impl MetaCompute + 'static) -> Self {
        Self::with_kind(MetaKind::Custom(Arc::new(compute)), backing)
    }

    /// The derivation
    pub fn kind(&self) -> &MetaKind {
        &self.kind
    }

    /// The opcode table, for opcode fields
    pub fn opcode_table(&self) -> Option<&OpcodeTable> {
        match &self.kind {
            MetaKind::Opcode(table) => Some(table),
            _ => None,
        }
    }

    /// The backing field
    pub fn backing(&self) -> &Field {
        &self.data
    }

    pub(crate) fn backing_mut(&mut self) -> &mut Field {
        &mut self.data
    }

    /// Current value of the backing field
    pub fn value(&self) -> Value {
        self.data.value()
    }

    /// Assign the backing field directly; the next recomputation may overwrite it
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<()> {
        self.data.set_value(value)
    }

    /// Encoded size of the backing field
    pub fn size(&self) -> usize {
        self.data.size()
    }

    /// The value implied by the message, `None` meaning "leave unchanged"
    pub(crate) fn compute(&self, ctx: &MetaContext<'_>) -> Result<Option<Value>> {
        match &self.kind {
            MetaKind::InclusiveLength => Ok(Some(ctx.size_from(ctx.layer_index()).into())),
            MetaKind::ExclusiveLength => Ok(Some(ctx.size_from(ctx.layer_index() + 1).into())),
            MetaKind::Opcode(table) => match ctx.next_layer() {
                Some(Layer::Struct(next)) => table
                    .code_for(next.schema())
                    .map(|code| Some(Value::Int(code)))
                    .ok_or_else(|| LayoutError::NoOpcodeForSchema(next.schema().name().to_string())),
                Some(Layer::Raw(_)) | None => Ok(None),
            },
            MetaKind::Checksum => {
                let preceding = ctx.preceding_bytes()?;
                Ok(Some(crc32c::crc32c(&preceding).into()))
            }
            MetaKind::Custom(compute) => compute.compute(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::scalar::Scalar;

    fn empty(name: &str) -> Arc<Schema> {
        Schema::builder(name).build().unwrap()
    }

    #[test]
    fn test_opcode_table_lookups() {
        let a = empty("A");
        let b = empty("B");
        let table = OpcodeTable::new([(a.clone(), 1), (b.clone(), 2)]).unwrap();
        assert_eq!(table.code_for(&b), Some(2));
        assert!(Arc::ptr_eq(table.schema_for(1).unwrap(), &a));
        assert!(table.schema_for(3).is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_opcode_table_rejects_duplicates() {
        let a = empty("A");
        let b = empty("B");
        let err = OpcodeTable::new([(a.clone(), 1), (b, 1)]).unwrap_err();
        assert_eq!(err, LayoutError::DuplicateOpcode(1));
        assert_eq!(err.kind(), ErrorKind::Schema);

        let err = OpcodeTable::new([(a.clone(), 1), (a, 2)]).unwrap_err();
        assert!(matches!(err, LayoutError::DuplicateOpcodeSchema(_)));
    }

    #[test]
    fn test_opcode_codes_must_fit_backing() {
        let table = OpcodeTable::new([(empty("Wide"), 300)]).unwrap();
        assert!(MetaField::opcode(Scalar::u8(0), table.clone()).is_err());
        assert!(MetaField::opcode(Scalar::u16(0), table).is_ok());
    }

    #[test]
    fn test_meta_field_behaves_like_backing() {
        let mut m = MetaField::inclusive_length(Scalar::u16(0));
        assert_eq!(m.size(), 2);
        m.set_value(7).unwrap();
        assert_eq!(m.value(), Value::Int(7));
        assert!(m.set_value(70_000).is_err());
        assert!(m.opcode_table().is_none());
    }
}
