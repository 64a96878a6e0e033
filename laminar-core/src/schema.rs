//! Schema definitions and the field-table builder
//!
//! A [`Schema`] is the reusable description of a struct layout: an ordered
//! field table with template values, the decode hooks registered per field,
//! and the schemas it extends. Schemas are immutable once built and shared
//! through `Arc`, so instances, opcode tables and nested fields can all refer
//! to the same definition.
//!
//! ## Field order
//!
//! Fields are collected parent by parent (each parent contributing its own
//! already-ordered table), then the schema's own fields. Fields marked as
//! footer fields keep that status wherever they are inherited and always end
//! up after every non-footer field:
//!
//! ```text
//! [non-footer fields in collection order] ++ [footer fields in collection order]
//! ```

use crate::constants::RESERVED_FIELD_NAMES;
use crate::decoder::{decode_struct, ByteSource, SliceSource, StreamSource};
use crate::endianness::Endianness;
use crate::error::LayoutError;
use crate::field::Field;
use crate::sequence::{LengthSource, Vector};
use crate::structure::Struct;
use crate::value::Value;
use crate::Result;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Callback run on a partially decoded instance right before a field is decoded
pub type DecodeHook = Arc<dyn Fn(&mut Struct) -> Result<()> + Send + Sync>;

/// Callback run on an instance right before it is encoded; an error aborts encoding
pub type PreEncodeHook = Arc<dyn Fn(&Struct) -> Result<()> + Send + Sync>;

/// Callback run with an instance and the bytes it was just encoded to
pub type PostEncodeHook = Arc<dyn Fn(&Struct, &[u8]) -> Result<()> + Send + Sync>;

/// An immutable struct layout
pub struct Schema {
    name: String,
    parents: Vec<Arc<Schema>>,
    footer: bool,
    endianness: Option<Endianness>,
    names: Vec<String>,
    footers: Vec<bool>,
    template: Vec<Field>,
    index: HashMap<String, usize>,
    hooks: Vec<Vec<DecodeHook>>,
    pre_encode: Vec<PreEncodeHook>,
    post_encode: Vec<PostEncodeHook>,
}

impl Schema {
    /// Start describing a schema called `name`
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            parents: Vec::new(),
            footer: false,
            endianness: None,
            fields: Vec::new(),
            hooks: Vec::new(),
            pre_encode: Vec::new(),
            post_encode: Vec::new(),
        }
    }

    /// Schema name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directly extended schemas, in declaration order
    pub fn parents(&self) -> &[Arc<Schema>] {
        &self.parents
    }

    /// Whether the schema's own fields were declared as footer fields
    pub fn is_footer(&self) -> bool {
        self.footer
    }

    /// Default byte order declared by this schema
    pub fn endianness(&self) -> Option<Endianness> {
        self.endianness
    }

    /// Number of fields in the table
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Field names in table order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Template fields in table order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.field_names().zip(self.template.iter())
    }

    /// Whether the named field is pinned to the end of the table
    pub fn is_footer_field(&self, name: &str) -> bool {
        self.index_of(name).is_some_and(|i| self.footers[i])
    }

    /// Position of `name` in the table
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn field_name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub(crate) fn hooks_for(&self, index: usize) -> &[DecodeHook] {
        &self.hooks[index]
    }

    pub(crate) fn pre_encode_hooks(&self) -> &[PreEncodeHook] {
        &self.pre_encode
    }

    pub(crate) fn post_encode_hooks(&self) -> &[PostEncodeHook] {
        &self.post_encode
    }

    /// True for this schema and every schema it extends, directly or not
    pub fn is_a(&self, other: &Schema) -> bool {
        std::ptr::eq(self, other) || self.parents.iter().any(|p| p.is_a(other))
    }

    /// Encoded size of a default instance
    pub fn size(&self) -> usize {
        self.template.iter().map(Field::size).sum()
    }

    /// Index of the schema's opcode field, if it declares exactly one
    pub fn opcode_field(&self) -> Result<Option<usize>> {
        let mut found = None;
        for (index, field) in self.template.iter().enumerate() {
            if field.as_meta().is_some_and(|m| m.opcode_table().is_some()) {
                if found.is_some() {
                    return Err(LayoutError::MultipleOpcodeFields(self.name.clone()));
                }
                found = Some(index);
            }
        }
        Ok(found)
    }

    /// A fresh instance holding deep copies of the template fields
    pub fn instance(self: &Arc<Self>) -> Struct {
        Struct::from_template(Arc::clone(self), self.template.clone())
    }

    /// A fresh instance with some fields assigned, each through [`Struct::set`]
    pub fn instance_with<I, K, V>(self: &Arc<Self>, values: I) -> Result<Struct>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut instance = self.instance();
        for (name, value) in values {
            instance.set(name.as_ref(), value)?;
        }
        Ok(instance)
    }

    /// Decode an instance from the front of `data`; trailing bytes are ignored
    pub fn decode(self: &Arc<Self>, data: &[u8]) -> Result<Struct> {
        self.decode_prefix(data).map(|(instance, _)| instance)
    }

    /// Decode an instance from the front of `data`, returning the bytes consumed
    pub fn decode_prefix(self: &Arc<Self>, data: &[u8]) -> Result<(Struct, usize)> {
        let mut src = SliceSource::new(data);
        let instance = decode_struct(self, &mut src)?;
        Ok((instance, src.consumed()))
    }

    /// Decode an instance, pulling exactly the bytes each field needs from `reader`
    pub fn decode_from_reader<R: Read + ?Sized>(self: &Arc<Self>, reader: &mut R) -> Result<Struct> {
        let mut src = StreamSource::new(reader);
        decode_struct(self, &mut src)
    }

    /// Decode an instance from any byte source
    pub fn decode_from(self: &Arc<Self>, src: &mut dyn ByteSource) -> Result<Struct> {
        decode_struct(self, src)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("fields", &self.names)
            .field("footer", &self.footer)
            .field("endianness", &self.endianness)
            .finish_non_exhaustive()
    }
}

/// Collects field declarations and builds a [`Schema`]
pub struct SchemaBuilder {
    name: String,
    parents: Vec<Arc<Schema>>,
    footer: bool,
    endianness: Option<Endianness>,
    fields: Vec<(String, Field)>,
    hooks: Vec<(String, DecodeHook)>,
    pre_encode: Vec<PreEncodeHook>,
    post_encode: Vec<PostEncodeHook>,
}

impl SchemaBuilder {
    /// Inherit the fields and decode hooks of `parent`
    pub fn extends(mut self, parent: &Arc<Schema>) -> Self {
        self.parents.push(Arc::clone(parent));
        self
    }

    /// Pin this schema's own fields to the end of every table that includes them
    pub fn footer(mut self, footer: bool) -> Self {
        self.footer = footer;
        self
    }

    /// Default byte order for scalars that do not set one
    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = Some(endianness);
        self
    }

    /// Declare a field
    pub fn field(mut self, name: impl Into<String>, field: impl Into<Field>) -> Self {
        self.fields.push((name.into(), field.into()));
        self
    }

    /// Run `hook` on the instance right before `field` is decoded
    pub fn decode_hook<F>(mut self, field: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&mut Struct) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.push((field.into(), Arc::new(hook)));
        self
    }

    /// Run `hook` on every instance right before it is encoded
    pub fn pre_encode_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Struct) -> Result<()> + Send + Sync + 'static,
    {
        self.pre_encode.push(Arc::new(hook));
        self
    }

    /// Run `hook` with every instance and its encoding once it is encoded
    pub fn post_encode_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Struct, &[u8]) -> Result<()> + Send + Sync + 'static,
    {
        self.post_encode.push(Arc::new(hook));
        self
    }

    /// Merge, check and freeze the field table
    pub fn build(self) -> Result<Arc<Schema>> {
        let SchemaBuilder {
            name,
            parents,
            footer,
            endianness,
            fields,
            hooks,
            pre_encode,
            post_encode,
        } = self;

        let mut collected: Vec<(String, Field, bool)> = Vec::new();
        for parent in &parents {
            for (index, (field_name, field)) in parent.fields().enumerate() {
                collected.push((field_name.to_string(), field.clone(), parent.footers[index]));
            }
        }
        collected.extend(fields.into_iter().map(|(n, f)| (n, f, footer)));

        let (regular, pinned): (Vec<_>, Vec<_>) =
            collected.into_iter().partition(|(_, _, is_footer)| !is_footer);

        let mut names = Vec::new();
        let mut footers = Vec::new();
        let mut template = Vec::new();
        let mut index = HashMap::new();
        for (field_name, field, is_footer) in regular.into_iter().chain(pinned) {
            if index.insert(field_name.clone(), names.len()).is_some() {
                return Err(LayoutError::DuplicateField {
                    schema: name,
                    field: field_name,
                });
            }
            names.push(field_name);
            footers.push(is_footer);
            template.push(field);
        }

        for field in &template {
            check_reserved_names(field)?;
        }

        if let Some(endianness) = endianness {
            for field in &mut template {
                field.inherit_endianness(endianness);
            }
        }

        link_vectors(&name, &names, &mut template)?;

        for (field_name, field) in names.iter().zip(&template) {
            field.validate().map_err(|e| LayoutError::InvalidDefault {
                field: field_name.clone(),
                reason: e.to_string(),
            })?;
        }

        let mut field_hooks: Vec<Vec<DecodeHook>> = vec![Vec::new(); names.len()];
        for parent in &parents {
            for (parent_index, parent_hooks) in parent.hooks.iter().enumerate() {
                if let Some(&i) = index.get(&parent.names[parent_index]) {
                    field_hooks[i].extend(parent_hooks.iter().cloned());
                }
            }
        }
        for (field_name, hook) in hooks {
            let i = *index
                .get(&field_name)
                .ok_or(LayoutError::UnknownHookField(field_name))?;
            field_hooks[i].push(hook);
        }

        let mut inherited_pre: Vec<PreEncodeHook> = Vec::new();
        let mut inherited_post: Vec<PostEncodeHook> = Vec::new();
        for parent in &parents {
            inherited_pre.extend(parent.pre_encode.iter().cloned());
            inherited_post.extend(parent.post_encode.iter().cloned());
        }
        inherited_pre.extend(pre_encode);
        inherited_post.extend(post_encode);

        #[cfg(feature = "logging")]
        debug!(
            schema = %name,
            fields = names.len(),
            parents = parents.len(),
            "Registered schema"
        );

        Ok(Arc::new(Schema {
            name,
            parents,
            footer,
            endianness,
            names,
            footers,
            template,
            index,
            hooks: field_hooks,
            pre_encode: inherited_pre,
            post_encode: inherited_post,
        }))
    }
}

/// Nested structs must keep the accessor names of the field contract free
fn check_reserved_names(field: &Field) -> Result<()> {
    let nested = match field {
        Field::Struct(s) => Some(s.schema()),
        Field::Array(a) => a.element().as_struct().map(Struct::schema),
        Field::Vector(v) => v.element().as_struct().map(Struct::schema),
        _ => None,
    };
    if let Some(schema) = nested {
        if let Some(reserved) = schema
            .field_names()
            .find(|n| RESERVED_FIELD_NAMES.contains(n))
        {
            return Err(LayoutError::ReservedFieldName {
                schema: schema.name().to_string(),
                name: reserved.to_string(),
            });
        }
    }
    Ok(())
}

/// Resolve every vector's length source to a preceding integer scalar, bind
/// the vector to it by name and initialize the scalar from the vector length
fn link_vectors(schema: &str, names: &[String], template: &mut [Field]) -> Result<()> {
    for vec_index in 0..template.len() {
        let (length_index, count) = match &template[vec_index] {
            Field::Vector(v) => (
                resolve_length_field(schema, &names[vec_index], v, names, template)?,
                v.len(),
            ),
            _ => continue,
        };
        let invalid = |reason: &str| LayoutError::InvalidLengthField {
            field: names[vec_index].clone(),
            length_field: names[length_index].clone(),
            reason: reason.to_string(),
        };
        if length_index >= vec_index {
            return Err(invalid("the length field must precede the vector"));
        }
        match &mut template[length_index] {
            Field::Scalar(s) if !s.kind().is_float() => s
                .set_value(count)
                .map_err(|e| invalid(&e.to_string()))?,
            _ => return Err(invalid("the length field must be an integer scalar")),
        }
        if let Field::Vector(v) = &mut template[vec_index] {
            v.bind(&names[length_index]);
        }
    }
    Ok(())
}

fn resolve_length_field(
    schema: &str,
    field: &str,
    vector: &Vector,
    names: &[String],
    template: &[Field],
) -> Result<usize> {
    let found = match vector.length_source() {
        LengthSource::Field(id) => template
            .iter()
            .position(|f| f.as_scalar().is_some_and(|s| s.id() == *id)),
        LengthSource::Name(name) => names.iter().position(|n| n == name),
    };
    found.ok_or_else(|| LayoutError::UnresolvedLengthField {
        schema: schema.to_string(),
        field: field.to_string(),
    })
}
