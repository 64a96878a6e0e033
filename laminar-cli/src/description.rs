//! Schema description files
//!
//! A description file declares schemas in JSON. Schemas may extend or nest
//! only schemas declared earlier in the same file:
//!
//! ```json
//! {
//!   "schemas": [
//!     { "name": "Body", "endianness": "big",
//!       "fields": [ { "name": "len", "type": "u16" },
//!                   { "name": "data", "type": "vector", "length_field": "len",
//!                     "element": { "type": "u8" } } ] }
//!   ]
//! }
//! ```

use anyhow::{anyhow, bail, Context, Result};
use laminar_core::validator::{RangeValidator, SetValidator};
use laminar_core::{
    Array, EnumField, Endianness, Field, MetaField, OpcodeTable, Scalar, ScalarKind, Schema,
    Struct, Value, Vector,
};
use serde::Deserialize;
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Top level of a description file
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaFile {
    /// Schemas in dependency order
    pub schemas: Vec<SchemaDescription>,
}

/// One schema
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDescription {
    /// Schema name
    pub name: String,
    /// Names of extended schemas
    #[serde(default)]
    pub parents: Vec<String>,
    /// Pin the schema's own fields to the end
    #[serde(default)]
    pub footer: bool,
    /// Default byte order
    pub endianness: Option<Endianness>,
    /// Own fields in declaration order
    pub fields: Vec<FieldDescription>,
}

/// A named field
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDescription {
    /// Field name
    pub name: String,
    /// Type and options
    #[serde(flatten)]
    pub spec: FieldSpec,
}

/// Options shared by all scalar types
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScalarSpec {
    /// Initial value
    pub default: Option<Json>,
    /// Byte order of this scalar
    pub endianness: Option<Endianness>,
    /// Inclusive lower bound
    pub min: Option<Json>,
    /// Inclusive upper bound
    pub max: Option<Json>,
    /// Allowed values
    pub one_of: Option<Vec<Json>>,
}

/// A named enum value
#[derive(Debug, Clone, Deserialize)]
pub struct VariantSpec {
    /// Symbolic name
    pub name: String,
    /// Wire value
    pub value: i64,
}

/// Field type and its options, tagged by `type`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldSpec {
    /// Unsigned 8-bit integer
    U8(ScalarSpec),
    /// Unsigned 16-bit integer
    U16(ScalarSpec),
    /// Unsigned 32-bit integer
    U32(ScalarSpec),
    /// Unsigned 64-bit integer
    U64(ScalarSpec),
    /// Signed 8-bit integer
    I8(ScalarSpec),
    /// Signed 16-bit integer
    I16(ScalarSpec),
    /// Signed 32-bit integer
    I32(ScalarSpec),
    /// Signed 64-bit integer
    I64(ScalarSpec),
    /// Single precision float
    F32(ScalarSpec),
    /// Double precision float
    F64(ScalarSpec),
    /// Integer restricted to named values
    Enum {
        /// Wire format
        kind: ScalarKind,
        /// Named values; the first is the default
        variants: Vec<VariantSpec>,
        /// Byte order
        endianness: Option<Endianness>,
        /// Initial variant name
        default: Option<String>,
    },
    /// Fixed-count sequence
    Array {
        /// Capacity
        length: usize,
        /// Element type
        element: Box<FieldSpec>,
        /// Pad short assignments with the element default
        #[serde(default)]
        fill: bool,
    },
    /// Sequence counted by a preceding field
    Vector {
        /// Name of the length field
        length_field: String,
        /// Element type
        element: Box<FieldSpec>,
    },
    /// Four-octet IPv4 address written as dotted-quad text
    Ipv4 {
        /// Initial address
        default: Option<String>,
    },
    /// Nested instance of an earlier schema
    Struct {
        /// Schema name
        schema: String,
    },
    /// Zero-size slot
    Placeholder,
    /// Size of the owning layer and everything after it
    InclusiveLength {
        /// Wire format
        kind: ScalarKind,
    },
    /// Size of everything after the owning layer
    ExclusiveLength {
        /// Wire format
        kind: ScalarKind,
    },
    /// CRC32C of the preceding message bytes
    Checksum {
        /// Wire format
        kind: ScalarKind,
    },
    /// Code of the next layer's schema
    Opcode {
        /// Wire format
        kind: ScalarKind,
        /// Schema name to code
        table: BTreeMap<String, i64>,
    },
}

/// Schemas built from a description file, by name
#[derive(Debug, Default)]
pub struct Registry {
    schemas: HashMap<String, Arc<Schema>>,
    order: Vec<String>,
}

impl Registry {
    /// Read and build every schema in `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
        let file: SchemaFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse schema file: {}", path.display()))?;
        Self::build(&file)
    }

    /// Build every schema of `file`, in order
    pub fn build(file: &SchemaFile) -> Result<Self> {
        let mut registry = Self::default();
        for description in &file.schemas {
            let schema = registry
                .build_schema(description)
                .with_context(|| format!("Failed to build schema '{}'", description.name))?;
            debug!("Built schema {} ({} fields)", schema.name(), schema.len());
            registry.order.push(description.name.clone());
            registry.schemas.insert(description.name.clone(), schema);
        }
        Ok(registry)
    }

    /// The named schema
    pub fn get(&self, name: &str) -> Result<&Arc<Schema>> {
        self.schemas
            .get(name)
            .ok_or_else(|| anyhow!("Unknown schema '{}'", name))
    }

    /// Schemas in file order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.order.iter().filter_map(|name| self.schemas.get(name))
    }

    fn build_schema(&self, description: &SchemaDescription) -> Result<Arc<Schema>> {
        let mut builder = Schema::builder(&description.name).footer(description.footer);
        for parent in &description.parents {
            builder = builder.extends(self.get(parent)?);
        }
        if let Some(endianness) = description.endianness {
            builder = builder.endianness(endianness);
        }
        for field in &description.fields {
            let built = self
                .build_field(&field.spec)
                .with_context(|| format!("Invalid field '{}'", field.name))?;
            builder = builder.field(&field.name, built);
        }
        Ok(builder.build()?)
    }

    fn build_field(&self, spec: &FieldSpec) -> Result<Field> {
        let field = match spec {
            FieldSpec::U8(s) => scalar(ScalarKind::U8, s)?.into(),
            FieldSpec::U16(s) => scalar(ScalarKind::U16, s)?.into(),
            FieldSpec::U32(s) => scalar(ScalarKind::U32, s)?.into(),
            FieldSpec::U64(s) => scalar(ScalarKind::U64, s)?.into(),
            FieldSpec::I8(s) => scalar(ScalarKind::I8, s)?.into(),
            FieldSpec::I16(s) => scalar(ScalarKind::I16, s)?.into(),
            FieldSpec::I32(s) => scalar(ScalarKind::I32, s)?.into(),
            FieldSpec::I64(s) => scalar(ScalarKind::I64, s)?.into(),
            FieldSpec::F32(s) => scalar(ScalarKind::F32, s)?.into(),
            FieldSpec::F64(s) => scalar(ScalarKind::F64, s)?.into(),
            FieldSpec::Enum {
                kind,
                variants,
                endianness,
                default,
            } => {
                let mut base = Scalar::zero(*kind);
                if let Some(endianness) = endianness {
                    base = base.with_endianness(*endianness);
                }
                let mut field = EnumField::new(
                    base,
                    variants.iter().map(|v| (v.name.clone(), i128::from(v.value))),
                )?;
                if let Some(name) = default {
                    field = field.with_variant(name)?;
                }
                field.into()
            }
            FieldSpec::Array {
                length,
                element,
                fill,
            } => {
                let array = Array::new(*length, self.build_field(element)?);
                if *fill {
                    array.with_fill().into()
                } else {
                    array.into()
                }
            }
            FieldSpec::Vector {
                length_field,
                element,
            } => Vector::new(length_field.as_str(), self.build_field(element)?).into(),
            FieldSpec::Ipv4 { default } => match default {
                Some(text) => Array::parse_ipv4(text)?.into(),
                None => Array::ipv4(Ipv4Addr::UNSPECIFIED).into(),
            },
            FieldSpec::Struct { schema } => self.get(schema)?.instance().into(),
            FieldSpec::Placeholder => Field::placeholder(),
            FieldSpec::InclusiveLength { kind } => {
                MetaField::inclusive_length(Scalar::zero(*kind)).into()
            }
            FieldSpec::ExclusiveLength { kind } => {
                MetaField::exclusive_length(Scalar::zero(*kind)).into()
            }
            FieldSpec::Checksum { kind } => MetaField::checksum(Scalar::zero(*kind)).into(),
            FieldSpec::Opcode { kind, table } => {
                let entries = table
                    .iter()
                    .map(|(name, code)| Ok((Arc::clone(self.get(name)?), i128::from(*code))))
                    .collect::<Result<Vec<_>>>()?;
                MetaField::opcode(Scalar::zero(*kind), OpcodeTable::new(entries)?)?.into()
            }
        };
        Ok(field)
    }
}

fn scalar(kind: ScalarKind, spec: &ScalarSpec) -> Result<Scalar> {
    let mut s = match &spec.default {
        Some(json) => Scalar::new(kind, json_number(json)?)?,
        None => Scalar::zero(kind),
    };
    if let Some(endianness) = spec.endianness {
        s = s.with_endianness(endianness);
    }
    let bounded = spec.min.is_some() || spec.max.is_some();
    if bounded && spec.one_of.is_some() {
        bail!("'one_of' cannot be combined with 'min' or 'max'");
    }
    if bounded {
        let min = match &spec.min {
            Some(json) => json_number(json)?,
            None => Value::Float(f64::NEG_INFINITY),
        };
        let max = match &spec.max {
            Some(json) => json_number(json)?,
            None => Value::Float(f64::INFINITY),
        };
        s = s.with_validator(RangeValidator::new(min, max));
    }
    if let Some(allowed) = &spec.one_of {
        let items = allowed.iter().map(json_number).collect::<Result<Vec<_>>>()?;
        s = s.with_validator(SetValidator::new(items));
    }
    Ok(s)
}

/// A JSON number as a field value
pub fn json_number(json: &Json) -> Result<Value> {
    if let Some(v) = json.as_i64() {
        Ok(Value::Int(v.into()))
    } else if let Some(v) = json.as_u64() {
        Ok(Value::Int(v.into()))
    } else if let Some(v) = json.as_f64() {
        Ok(Value::Float(v))
    } else {
        bail!("Expected a number, got {}", json)
    }
}

/// Assign the members of a JSON object to the matching fields of `instance`
pub fn apply_json(instance: &mut Struct, values: &Json) -> Result<()> {
    let object = values
        .as_object()
        .ok_or_else(|| anyhow!("Expected a JSON object for {}", instance.schema().name()))?;
    for (name, json) in object {
        let value = field_value(instance.field(name)?, json)
            .with_context(|| format!("Invalid value for field '{}'", name))?;
        instance.set(name, value)?;
    }
    Ok(())
}

/// Convert `json` to a value shaped like `field`
fn field_value(field: &Field, json: &Json) -> Result<Value> {
    match field {
        Field::Struct(template) => {
            let mut nested = template.clone();
            apply_json(&mut nested, json)?;
            Ok(Value::Struct(nested))
        }
        Field::Enum(e) => match json.as_str() {
            Some(name) => {
                let mut e = e.clone();
                e.set_variant(name)?;
                Ok(e.value().clone())
            }
            None => json_number(json),
        },
        Field::Array(a) => match json.as_str() {
            Some(text) => Ok(Value::List(Array::parse_ipv4(text)?.items().to_vec())),
            None => sequence_value(a.element(), json),
        },
        Field::Vector(v) => sequence_value(v.element(), json),
        Field::Meta(m) => field_value(m.backing(), json),
        _ => json_number(json),
    }
}

fn sequence_value(element: &Field, json: &Json) -> Result<Value> {
    let items = json
        .as_array()
        .ok_or_else(|| anyhow!("Expected a JSON array, got {}", json))?;
    let values = items
        .iter()
        .map(|item| field_value(element, item))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::List(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry(json: Json) -> Result<Registry> {
        let file: SchemaFile = serde_json::from_value(json)?;
        Registry::build(&file)
    }

    #[test]
    fn test_build_schemas_in_order() {
        let registry = registry(json!({
            "schemas": [
                { "name": "Point", "endianness": "little",
                  "fields": [ { "name": "x", "type": "i16" }, { "name": "y", "type": "i16" } ] },
                { "name": "Shape", "endianness": "big",
                  "fields": [
                    { "name": "kind", "type": "enum", "kind": "u8",
                      "variants": [ { "name": "line", "value": 1 }, { "name": "poly", "value": 2 } ] },
                    { "name": "count", "type": "u8" },
                    { "name": "points", "type": "vector", "length_field": "count",
                      "element": { "type": "struct", "schema": "Point" } }
                  ] }
            ]
        }))
        .unwrap();

        let shape = registry.get("Shape").unwrap();
        let mut s = shape.instance();
        apply_json(
            &mut s,
            &json!({ "kind": "poly", "points": [ { "x": 1, "y": -1 }, { "x": 2, "y": 3 } ] }),
        )
        .unwrap();
        assert_eq!(s.get_int("count").unwrap(), 2);
        assert_eq!(s.get_int("kind").unwrap(), 2);
        assert_eq!(
            s.encode().unwrap().as_ref(),
            &[2, 2, 1, 0, 0xFF, 0xFF, 2, 0, 3, 0]
        );
        assert_eq!(registry.iter().count(), 2);
    }

    #[test]
    fn test_scalar_options() {
        let registry = registry(json!({
            "schemas": [ { "name": "Opts", "fields": [
                { "name": "a", "type": "u8", "default": 5, "min": 1, "max": 9 },
                { "name": "b", "type": "u8", "default": 2, "one_of": [2, 4] }
            ] } ]
        }))
        .unwrap();
        let mut s = registry.get("Opts").unwrap().instance();
        assert_eq!(s.get_int("a").unwrap(), 5);
        assert!(s.set("a", 10).is_err());
        assert!(s.set("b", 3).is_err());
        s.set("b", 4).unwrap();
    }

    #[test]
    fn test_ipv4_fields_take_dotted_quads() {
        let registry = registry(json!({
            "schemas": [ { "name": "Hop", "fields": [
                { "name": "via", "type": "ipv4", "default": "10.1.2.3" },
                { "name": "ttl", "type": "u8", "default": 64 }
            ] } ]
        }))
        .unwrap();
        let mut s = registry.get("Hop").unwrap().instance();
        assert_eq!(s.encode().unwrap().as_ref(), &[10, 1, 2, 3, 64]);

        apply_json(&mut s, &json!({ "via": "172.16.0.9" })).unwrap();
        assert_eq!(s.encode().unwrap().as_ref(), &[172, 16, 0, 9, 64]);
        assert!(apply_json(&mut s, &json!({ "via": "172.16.0" })).is_err());
    }

    #[test]
    fn test_forward_references_are_rejected() {
        let err = registry(json!({
            "schemas": [ { "name": "Outer", "fields": [
                { "name": "inner", "type": "struct", "schema": "Inner" }
            ] } ]
        }))
        .unwrap_err();
        assert!(format!("{:#}", err).contains("Unknown schema 'Inner'"));
    }

    #[test]
    fn test_opcode_table_by_name() {
        let registry = registry(json!({
            "schemas": [
                { "name": "Ping", "fields": [ { "name": "seq", "type": "u8" } ] },
                { "name": "Header", "fields": [
                    { "name": "op", "type": "opcode", "kind": "u8", "table": { "Ping": 3 } },
                    { "name": "len", "type": "inclusive_length", "kind": "u8" }
                ] }
            ]
        }))
        .unwrap();
        let header = registry.get("Header").unwrap();
        assert_eq!(header.opcode_field().unwrap(), Some(0));
    }
}
