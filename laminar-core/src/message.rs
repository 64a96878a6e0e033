//! Layered messages
//!
//! A [`Message`] is an ordered list of layers, each a struct instance or a
//! blob of raw bytes. Every public mutation ends with a recomputation pass
//! over the meta-fields of every layer, so a message is always internally
//! consistent: length fields cover the right layers, opcode fields announce
//! the layer that follows them.
//!
//! Recomputation visits layers front to back and fields in table order, and
//! each computed value is stored before the next one is computed. A checksum
//! placed after a length field therefore covers the updated length.
//!
//! ```text
//! Header / Body / Trailer
//!   Header.length  = size(Header) + size(Body) + size(Trailer)
//!   Header.opcode  = code_for(Body)
//! ```

use crate::decoder::{decode_struct, ByteSource, SliceSource, StreamSource};
use crate::error::LayoutError;
use crate::field::Field;
use crate::meta::MetaContext;
use crate::schema::Schema;
use crate::structure::{InstanceId, Struct};
use crate::Result;
use bytes::{Bytes, BytesMut};
use serde::ser::{Serialize, Serializer};
use std::fmt;
use std::io::Read;
use std::ops::{Add, Bound, Div, Index, RangeBounds};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// One layer of a message
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    /// A struct instance
    Struct(Struct),
    /// Bytes carried verbatim
    Raw(Bytes),
}

impl Layer {
    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        match self {
            Layer::Struct(s) => s.size(),
            Layer::Raw(b) => b.len(),
        }
    }

    /// Append the encoding to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Layer::Struct(s) => s.encode_into(buf),
            Layer::Raw(b) => {
                buf.extend_from_slice(b);
                Ok(())
            }
        }
    }

    /// The struct, if this is a struct layer
    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Layer::Struct(s) => Some(s),
            Layer::Raw(_) => None,
        }
    }

    /// The bytes, if this is a raw layer
    pub fn as_raw(&self) -> Option<&Bytes> {
        match self {
            Layer::Raw(b) => Some(b),
            Layer::Struct(_) => None,
        }
    }

    fn snapshot(&self) -> Layer {
        match self {
            Layer::Struct(s) => Layer::Struct(s.snapshot()),
            Layer::Raw(b) => Layer::Raw(b.clone()),
        }
    }
}

impl From<Struct> for Layer {
    fn from(s: Struct) -> Self {
        Layer::Struct(s)
    }
}

impl From<Bytes> for Layer {
    fn from(b: Bytes) -> Self {
        Layer::Raw(b)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Struct(s) => write!(f, "{}", s),
            Layer::Raw(b) => write!(f, "Raw({} bytes)", b.len()),
        }
    }
}

impl Serialize for Layer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Layer::Struct(s) => s.serialize(serializer),
            Layer::Raw(b) => serializer.serialize_bytes(b),
        }
    }
}

/// Anything that can be appended to a message
pub trait IntoLayers {
    /// The layers to append, in order
    fn into_layers(self) -> Vec<Layer>;
}

impl IntoLayers for Struct {
    fn into_layers(self) -> Vec<Layer> {
        vec![Layer::Struct(self)]
    }
}

impl IntoLayers for Layer {
    fn into_layers(self) -> Vec<Layer> {
        vec![self]
    }
}

impl IntoLayers for Message {
    fn into_layers(self) -> Vec<Layer> {
        self.layers
    }
}

impl IntoLayers for Vec<Layer> {
    fn into_layers(self) -> Vec<Layer> {
        self
    }
}

impl IntoLayers for Bytes {
    fn into_layers(self) -> Vec<Layer> {
        vec![Layer::Raw(self)]
    }
}

impl IntoLayers for Vec<u8> {
    fn into_layers(self) -> Vec<Layer> {
        vec![Layer::Raw(Bytes::from(self))]
    }
}

impl IntoLayers for &[u8] {
    fn into_layers(self) -> Vec<Layer> {
        vec![Layer::Raw(Bytes::copy_from_slice(self))]
    }
}

/// Append `new`, merging raw bytes into a trailing raw layer and dropping empty ones
fn extend_layers(layers: &mut Vec<Layer>, new: Vec<Layer>) {
    for layer in new {
        match layer {
            Layer::Raw(more) if more.is_empty() => {}
            Layer::Raw(more) => match layers.last_mut() {
                Some(Layer::Raw(tail)) => {
                    let mut merged = BytesMut::with_capacity(tail.len() + more.len());
                    merged.extend_from_slice(tail);
                    merged.extend_from_slice(&more);
                    *tail = merged.freeze();
                }
                _ => layers.push(Layer::Raw(more)),
            },
            layer => layers.push(layer),
        }
    }
}

/// Selects a layer of a message
#[derive(Debug, Clone)]
pub enum LayerKey {
    /// Position in the message
    Index(usize),
    /// First layer that is an instance of the schema (or of one extending it)
    Schema(Arc<Schema>),
    /// The n-th (zero-based) layer that is an instance of the schema
    Nth(Arc<Schema>, usize),
    /// The layer holding this very instance
    Instance(InstanceId),
}

impl From<usize> for LayerKey {
    fn from(index: usize) -> Self {
        LayerKey::Index(index)
    }
}

impl From<&Arc<Schema>> for LayerKey {
    fn from(schema: &Arc<Schema>) -> Self {
        LayerKey::Schema(Arc::clone(schema))
    }
}

impl From<(&Arc<Schema>, usize)> for LayerKey {
    fn from((schema, n): (&Arc<Schema>, usize)) -> Self {
        LayerKey::Nth(Arc::clone(schema), n)
    }
}

impl From<&Struct> for LayerKey {
    fn from(instance: &Struct) -> Self {
        LayerKey::Instance(instance.id())
    }
}

impl From<InstanceId> for LayerKey {
    fn from(id: InstanceId) -> Self {
        LayerKey::Instance(id)
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKey::Index(i) => write!(f, "index {}", i),
            LayerKey::Schema(s) => write!(f, "{}", s.name()),
            LayerKey::Nth(s, n) => write!(f, "{}[{}]", s.name(), n),
            LayerKey::Instance(id) => write!(f, "{:?}", id),
        }
    }
}

/// An ordered list of layers with self-maintaining meta-fields
#[derive(Debug, Clone, Default)]
pub struct Message {
    layers: Vec<Layer>,
}

impl Message {
    /// An empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// A message holding `layers`, with meta-fields computed
    pub fn from_layers(layers: impl IntoLayers) -> Result<Self> {
        let mut message = Self::new();
        message.append(layers)?;
        Ok(message)
    }

    /// Layers in order
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Iterate over the layers
    pub fn iter(&self) -> std::slice::Iter<'_, Layer> {
        self.layers.iter()
    }

    /// Number of layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether there are no layers
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Total encoded size in bytes
    pub fn size(&self) -> usize {
        self.layers.iter().map(Layer::size).sum()
    }

    /// Concatenate the encoding of every layer
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.size());
        for layer in &self.layers {
            layer.encode_into(&mut buf)?;
        }
        Ok(buf.freeze())
    }

    /// Append layers; messages are flattened and raw bytes merge into a trailing raw layer
    pub fn append(&mut self, layers: impl IntoLayers) -> Result<()> {
        let new = layers.into_layers();
        self.transact(move |layers| {
            extend_layers(layers, new);
            Ok(())
        })
    }

    /// Replace the selected layer
    pub fn replace(&mut self, key: impl Into<LayerKey>, layer: impl Into<Layer>) -> Result<()> {
        let index = self.position(key)?;
        let layer = layer.into();
        self.transact(move |layers| {
            layers[index] = layer;
            Ok(())
        })
    }

    /// Mutate the selected struct layer in place
    pub fn modify<F>(&mut self, key: impl Into<LayerKey>, f: F) -> Result<()>
    where
        F: FnOnce(&mut Struct) -> Result<()>,
    {
        let index = self.position(key)?;
        self.transact(move |layers| match &mut layers[index] {
            Layer::Struct(s) => f(s),
            Layer::Raw(_) => Err(LayoutError::TypeMismatch {
                expected: "struct layer",
                actual: "raw bytes".to_string(),
            }),
        })
    }

    /// Apply `change` and recompute; on any error the previous layers are restored
    fn transact<F>(&mut self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Layer>) -> Result<()>,
    {
        let snapshot: Vec<Layer> = self.layers.iter().map(Layer::snapshot).collect();
        let result = change(&mut self.layers).and_then(|_| self.recompute());
        if let Err(_err) = &result {
            #[cfg(feature = "logging")]
            warn!(error = %_err, "Rolled back message mutation");
            self.layers = snapshot;
        }
        result
    }

    /// Recompute every meta-field from the current layers
    pub fn recompute(&mut self) -> Result<()> {
        for layer_index in 0..self.layers.len() {
            let schema = match &self.layers[layer_index] {
                Layer::Struct(s) => Arc::clone(s.schema()),
                Layer::Raw(_) => continue,
            };
            for field_index in 0..schema.len() {
                let name = schema.field_name(field_index);
                let computed = match &self.layers[layer_index] {
                    Layer::Struct(s) => match s.field_at(field_index) {
                        Field::Meta(m) => m
                            .compute(&MetaContext::new(self, layer_index, field_index))
                            .map_err(|e| e.in_field(name))?,
                        _ => None,
                    },
                    Layer::Raw(_) => None,
                };
                let Some(value) = computed else { continue };
                if let Layer::Struct(s) = &mut self.layers[layer_index] {
                    if let Field::Meta(m) = s.field_at_mut(field_index) {
                        m.set_value(value).map_err(|e| {
                            #[cfg(feature = "logging")]
                            warn!(layer = layer_index, field = name, error = %e, "Rejected meta-field value");
                            e.in_field(name)
                        })?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Check that every meta-field holds the value the message implies
    pub fn verify(&self) -> Result<()> {
        let mut expected = self.clone();
        expected.recompute()?;
        for (layer_index, (stored, wanted)) in self.layers.iter().zip(&expected.layers).enumerate() {
            let (Layer::Struct(stored), Layer::Struct(wanted)) = (stored, wanted) else {
                continue;
            };
            for ((name, field), (_, want)) in stored.iter().zip(wanted.iter()) {
                if field.as_meta().is_some() && field.value() != want.value() {
                    return Err(LayoutError::MetaMismatch {
                        layer: layer_index,
                        field: name.to_string(),
                        stored: field.value().to_string(),
                        expected: want.value().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Index of the selected layer
    pub fn position(&self, key: impl Into<LayerKey>) -> Result<usize> {
        let key = key.into();
        let (schema, nth) = match &key {
            LayerKey::Index(i) if *i < self.layers.len() => return Ok(*i),
            LayerKey::Index(_) => return Err(LayoutError::LayerNotFound(key.to_string())),
            LayerKey::Instance(id) => {
                return self
                    .layers
                    .iter()
                    .position(|l| l.as_struct().is_some_and(|s| s.id() == *id))
                    .ok_or_else(|| LayoutError::LayerNotFound(key.to_string()))
            }
            LayerKey::Schema(schema) => (schema, 0),
            LayerKey::Nth(schema, n) => (schema, *n),
        };

        let mut found = 0;
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.as_struct().is_some_and(|s| s.is_a(schema)) {
                if found == nth {
                    return Ok(index);
                }
                found += 1;
            }
        }
        if found == 0 {
            Err(LayoutError::LayerNotFound(key.to_string()))
        } else {
            Err(LayoutError::TooFewMatches {
                key: schema.name().to_string(),
                found,
                requested: nth + 1,
            })
        }
    }

    /// The selected layer
    pub fn get(&self, key: impl Into<LayerKey>) -> Result<&Layer> {
        let index = self.position(key)?;
        Ok(&self.layers[index])
    }

    /// First layer that is an instance of `schema`
    pub fn find(&self, schema: &Arc<Schema>) -> Result<&Struct> {
        self.find_nth(schema, 0)
    }

    /// The n-th (zero-based) layer that is an instance of `schema`
    pub fn find_nth(&self, schema: &Arc<Schema>, n: usize) -> Result<&Struct> {
        let index = self.position((schema, n))?;
        self.layers[index]
            .as_struct()
            .ok_or_else(|| LayoutError::LayerNotFound(schema.name().to_string()))
    }

    /// Whether any layer matches `key`
    pub fn contains(&self, key: impl Into<LayerKey>) -> bool {
        self.position(key).is_ok()
    }

    /// A sub-message of the layers in `range`, clamped to the message.
    ///
    /// Layers keep their identity and meta-fields are not recomputed.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Message {
        let len = self.layers.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(len);
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        }
        .clamp(start, len);
        Message {
            layers: self.layers[start..end].iter().map(Layer::snapshot).collect(),
        }
    }

    /// Decode a header, the body its opcode selects, then each of `extra` in turn.
    ///
    /// An extra schema with an opcode field is decoded as a header of its own
    /// chain. Bytes left over at the end become a final raw layer. Meta-fields
    /// keep the values that were decoded.
    pub fn from_bytes(header: &Arc<Schema>, data: &[u8], extra: &[Arc<Schema>]) -> Result<Message> {
        let mut src = SliceSource::new(data);
        let mut layers = decode_chain(header, &mut src, extra)?;
        let rest = src.remaining();
        if !rest.is_empty() {
            layers.push(Layer::Raw(Bytes::copy_from_slice(rest)));
        }
        Ok(Message { layers })
    }

    /// Like [`Message::from_bytes`], pulling exactly the needed bytes from `reader`
    pub fn from_reader<R: Read + ?Sized>(
        header: &Arc<Schema>,
        reader: &mut R,
        extra: &[Arc<Schema>],
    ) -> Result<Message> {
        let mut src = StreamSource::new(reader);
        let layers = decode_chain(header, &mut src, extra)?;
        Ok(Message { layers })
    }
}

/// Schema announced by the opcode field at `index` of `instance`
fn announced_schema(instance: &Struct, index: usize) -> Option<Arc<Schema>> {
    let meta = instance.field_at(index).as_meta()?;
    let code = meta.value().as_int()?;
    let schema = meta.opcode_table()?.schema_for(code)?;

    #[cfg(feature = "logging")]
    debug!(
        header = %instance.schema().name(),
        opcode = code,
        body = %schema.name(),
        "Dispatching on opcode"
    );

    Some(Arc::clone(schema))
}

fn decode_chain(
    header: &Arc<Schema>,
    src: &mut dyn ByteSource,
    extra: &[Arc<Schema>],
) -> Result<Vec<Layer>> {
    let opcode_index = header
        .opcode_field()?
        .ok_or_else(|| LayoutError::MissingOpcodeField(header.name().to_string()))?;
    let mut current = decode_struct(header, src)?;
    let mut next = announced_schema(&current, opcode_index).ok_or_else(|| {
        LayoutError::UnknownOpcode {
            schema: header.name().to_string(),
            code: current.field_at(opcode_index).value().as_int().unwrap_or_default(),
        }
    })?;

    // A body with a resolvable opcode of its own selects one more layer
    let mut layers = Vec::new();
    loop {
        layers.push(Layer::Struct(current));
        let body = decode_struct(&next, src)?;
        let chained = match body.schema().opcode_field() {
            Ok(Some(index)) => announced_schema(&body, index),
            _ => None,
        };
        match chained {
            Some(schema) => {
                next = schema;
                current = body;
            }
            None => {
                layers.push(Layer::Struct(body));
                break;
            }
        }
    }

    for schema in extra {
        match schema.opcode_field()? {
            Some(_) => layers.extend(decode_chain(schema, src, &[])?),
            None => layers.push(Layer::Struct(decode_struct(schema, src)?)),
        }
    }
    Ok(layers)
}

impl Index<usize> for Message {
    type Output = Layer;

    fn index(&self, index: usize) -> &Layer {
        &self.layers[index]
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = &'a Layer;
    type IntoIter = std::slice::Iter<'a, Layer>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}

/// Messages are equal when their layers are pairwise equal
impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.layers == other.layers
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, layer) in self.layers.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", layer)?;
        }
        Ok(())
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.layers)
    }
}

/// Join two layer lists into a recomputed message
fn concat(lhs: impl IntoLayers, rhs: impl IntoLayers) -> Result<Message> {
    let mut layers = lhs.into_layers();
    extend_layers(&mut layers, rhs.into_layers());
    let mut message = Message { layers };
    message.recompute()?;
    Ok(message)
}

macro_rules! layering_ops {
    ($($trait:ident :: $method:ident),*) => {
        $(
            impl<R: IntoLayers> $trait<R> for Struct {
                type Output = Result<Message>;

                fn $method(self, rhs: R) -> Result<Message> {
                    concat(self, rhs)
                }
            }

            impl<R: IntoLayers> $trait<R> for Message {
                type Output = Result<Message>;

                fn $method(self, rhs: R) -> Result<Message> {
                    concat(self, rhs)
                }
            }

            layering_ops!(@chain $trait :: $method, Struct, Message, Layer);
        )*
    };
    (@chain $trait:ident :: $method:ident, $($rhs:ty),*) => {
        $(
            impl $trait<$rhs> for Result<Message> {
                type Output = Result<Message>;

                fn $method(self, rhs: $rhs) -> Result<Message> {
                    concat(self?, rhs)
                }
            }
        )*
    };
}

layering_ops!(Div::div, Add::add);
