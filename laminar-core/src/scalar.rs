//! Fixed-width numeric fields and enums

use crate::endianness::{default_endianness, Endianness};
use crate::error::LayoutError;
use crate::validator::{IntoValidator, SetValidator, ValidatorRef};
use crate::value::Value;
use crate::Result;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Binary format of a scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Unsigned 64-bit integer
    U64,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// Signed 64-bit integer
    I64,
    /// IEEE 754 single precision
    F32,
    /// IEEE 754 double precision
    F64,
}

impl ScalarKind {
    /// Encoded width in bytes
    pub const fn width(self) -> usize {
        match self {
            ScalarKind::U8 | ScalarKind::I8 => 1,
            ScalarKind::U16 | ScalarKind::I16 => 2,
            ScalarKind::U32 | ScalarKind::I32 | ScalarKind::F32 => 4,
            ScalarKind::U64 | ScalarKind::I64 | ScalarKind::F64 => 8,
        }
    }

    /// Whether this is a floating point format
    pub const fn is_float(self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }

    /// Lowercase name, e.g. `u16`
    pub const fn name(self) -> &'static str {
        match self {
            ScalarKind::U8 => "u8",
            ScalarKind::U16 => "u16",
            ScalarKind::U32 => "u32",
            ScalarKind::U64 => "u64",
            ScalarKind::I8 => "i8",
            ScalarKind::I16 => "i16",
            ScalarKind::I32 => "i32",
            ScalarKind::I64 => "i64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
        }
    }

    /// Inclusive integer bounds, `None` for float formats
    pub const fn int_bounds(self) -> Option<(i128, i128)> {
        match self {
            ScalarKind::U8 => Some((0, u8::MAX as i128)),
            ScalarKind::U16 => Some((0, u16::MAX as i128)),
            ScalarKind::U32 => Some((0, u32::MAX as i128)),
            ScalarKind::U64 => Some((0, u64::MAX as i128)),
            ScalarKind::I8 => Some((i8::MIN as i128, i8::MAX as i128)),
            ScalarKind::I16 => Some((i16::MIN as i128, i16::MAX as i128)),
            ScalarKind::I32 => Some((i32::MIN as i128, i32::MAX as i128)),
            ScalarKind::I64 => Some((i64::MIN as i128, i64::MAX as i128)),
            ScalarKind::F32 | ScalarKind::F64 => None,
        }
    }

    /// Check that `value` is representable and normalize it.
    ///
    /// Integers assigned to float formats become floats and `f32` values are
    /// rounded to single precision; everything else is returned unchanged.
    pub fn check(self, value: Value) -> Result<Value> {
        match (self.int_bounds(), value) {
            (Some((min, max)), Value::Int(v)) => {
                if v < min || v > max {
                    return Err(LayoutError::OutOfRange {
                        value: v.to_string(),
                        kind: self.name(),
                    });
                }
                Ok(Value::Int(v))
            }
            (None, Value::Int(v)) => self.check(Value::Float(v as f64)),
            (None, Value::Float(v)) => {
                if self == ScalarKind::F32 && v.is_finite() && v.abs() > f32::MAX as f64 {
                    return Err(LayoutError::OutOfRange {
                        value: v.to_string(),
                        kind: self.name(),
                    });
                }
                if self == ScalarKind::F32 {
                    return Ok(Value::Float(v as f32 as f64));
                }
                Ok(Value::Float(v))
            }
            (_, other) => Err(LayoutError::TypeMismatch {
                expected: if self.is_float() { "number" } else { "integer" },
                actual: other.to_string(),
            }),
        }
    }

    /// Default value for the format: zero
    pub const fn zero(self) -> Value {
        if self.is_float() {
            Value::Float(0.0)
        } else {
            Value::Int(0)
        }
    }

    /// Append the encoding of an already-checked value
    fn put(self, buf: &mut BytesMut, value: &Value, little: bool) -> Result<()> {
        macro_rules! put_int {
            ($t:ty, $be:ident, $le:ident) => {{
                let v = value.as_int().ok_or_else(|| self.mismatch(value))?;
                let v = <$t>::try_from(v).map_err(|_| LayoutError::OutOfRange {
                    value: v.to_string(),
                    kind: self.name(),
                })?;
                if little {
                    buf.$le(v)
                } else {
                    buf.$be(v)
                }
            }};
        }

        match self {
            ScalarKind::U8 => put_int!(u8, put_u8, put_u8),
            ScalarKind::I8 => put_int!(i8, put_i8, put_i8),
            ScalarKind::U16 => put_int!(u16, put_u16, put_u16_le),
            ScalarKind::I16 => put_int!(i16, put_i16, put_i16_le),
            ScalarKind::U32 => put_int!(u32, put_u32, put_u32_le),
            ScalarKind::I32 => put_int!(i32, put_i32, put_i32_le),
            ScalarKind::U64 => put_int!(u64, put_u64, put_u64_le),
            ScalarKind::I64 => put_int!(i64, put_i64, put_i64_le),
            ScalarKind::F32 => {
                let v = value.as_f64().ok_or_else(|| self.mismatch(value))? as f32;
                if little {
                    buf.put_f32_le(v)
                } else {
                    buf.put_f32(v)
                }
            }
            ScalarKind::F64 => {
                let v = value.as_f64().ok_or_else(|| self.mismatch(value))?;
                if little {
                    buf.put_f64_le(v)
                } else {
                    buf.put_f64(v)
                }
            }
        }
        Ok(())
    }

    /// Interpret exactly `self.width()` bytes
    fn read(self, data: &[u8], little: bool) -> Value {
        macro_rules! read_as {
            ($t:ty) => {{
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(data);
                if little {
                    <$t>::from_le_bytes(raw)
                } else {
                    <$t>::from_be_bytes(raw)
                }
            }};
        }

        match self {
            ScalarKind::U8 => Value::Int(data[0] as i128),
            ScalarKind::I8 => Value::Int(data[0] as i8 as i128),
            ScalarKind::U16 => Value::Int(read_as!(u16) as i128),
            ScalarKind::I16 => Value::Int(read_as!(i16) as i128),
            ScalarKind::U32 => Value::Int(read_as!(u32) as i128),
            ScalarKind::I32 => Value::Int(read_as!(i32) as i128),
            ScalarKind::U64 => Value::Int(read_as!(u64) as i128),
            ScalarKind::I64 => Value::Int(read_as!(i64) as i128),
            ScalarKind::F32 => Value::Float(read_as!(f32) as f64),
            ScalarKind::F64 => Value::Float(read_as!(f64)),
        }
    }

    fn mismatch(self, value: &Value) -> LayoutError {
        LayoutError::TypeMismatch {
            expected: self.name(),
            actual: value.to_string(),
        }
    }
}

/// Identity of a declared field, used to bind vectors to their length field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(u64);

impl FieldId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        FieldId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A fixed-width numeric field
///
/// Clones share the [`FieldId`] of the original, so a clone of a length field
/// still identifies it when a vector is bound to it.
#[derive(Debug, Clone)]
pub struct Scalar {
    id: FieldId,
    kind: ScalarKind,
    value: Value,
    endianness: Option<Endianness>,
    validator: Option<ValidatorRef>,
}

macro_rules! scalar_ctor {
    ($($name:ident: $t:ty => $kind:ident),* $(,)?) => {
        $(
            #[doc = concat!("A `", stringify!($t), "` scalar holding `value`")]
            pub fn $name(value: $t) -> Self {
                Self::with_kind(ScalarKind::$kind, value.into())
            }
        )*
    };
}

impl Scalar {
    scalar_ctor! {
        u8: u8 => U8,
        u16: u16 => U16,
        u32: u32 => U32,
        u64: u64 => U64,
        i8: i8 => I8,
        i16: i16 => I16,
        i32: i32 => I32,
        i64: i64 => I64,
        f32: f32 => F32,
        f64: f64 => F64,
    }

    fn with_kind(kind: ScalarKind, value: Value) -> Self {
        Self {
            id: FieldId::next(),
            kind,
            value,
            endianness: None,
            validator: None,
        }
    }

    /// A scalar of `kind` holding `value`, which must fit the format
    pub fn new(kind: ScalarKind, value: impl Into<Value>) -> Result<Self> {
        let value = kind.check(value.into())?;
        Ok(Self::with_kind(kind, value))
    }

    /// A zero-valued scalar of `kind`
    pub fn zero(kind: ScalarKind) -> Self {
        Self::with_kind(kind, kind.zero())
    }

    /// Fix the byte order of this scalar, overriding any schema default
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = Some(endianness);
        self
    }

    /// Attach a validator. The current value is checked when the owning schema is built.
    pub fn with_validator(mut self, validator: impl IntoValidator) -> Self {
        self.validator = Some(validator.into_validator());
        self
    }

    /// Identity shared by this scalar and its clones
    pub fn id(&self) -> FieldId {
        self.id
    }

    /// Binary format
    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    /// Current value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Current value as an integer, if the format is an integer format
    pub fn as_int(&self) -> Option<i128> {
        self.value.as_int()
    }

    /// Assign a value after checking the format and the validator
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<()> {
        let value = self.kind.check(value.into())?;
        if let Some(validator) = &self.validator {
            validator.validate(&value)?;
        }
        self.value = value;
        Ok(())
    }

    /// The validator, if any
    pub fn validator(&self) -> Option<&ValidatorRef> {
        self.validator.as_ref()
    }

    pub(crate) fn set_validator(&mut self, validator: ValidatorRef) {
        self.validator = Some(validator);
    }

    /// Re-run the validator against the current value
    pub fn validate(&self) -> Result<()> {
        match &self.validator {
            Some(validator) => validator.validate(&self.value),
            None => Ok(()),
        }
    }

    /// The endianness set on this scalar or given to it by its schema
    pub fn explicit_endianness(&self) -> Option<Endianness> {
        self.endianness
    }

    /// Resolved byte order: own, then schema-assigned, then the process default
    pub fn endianness(&self) -> Endianness {
        self.endianness.unwrap_or_else(default_endianness)
    }

    /// Assign `endianness` unless one is already set; returns whether it was applied
    pub(crate) fn inherit_endianness(&mut self, endianness: Endianness) -> bool {
        if self.endianness.is_none() {
            self.endianness = Some(endianness);
            true
        } else {
            false
        }
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        self.kind.width()
    }

    /// Append the encoding to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        self.kind.put(buf, &self.value, self.endianness().is_little())
    }

    /// Encode to a fresh buffer
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.size());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Replace the value with the one encoded in `data`, which must be exactly `size()` bytes.
    ///
    /// The validator is not consulted; callers re-validate after decoding.
    pub fn decode(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != self.size() {
            return Err(LayoutError::IncompleteData {
                expected: self.size(),
                actual: data.len(),
            });
        }
        self.value = self.kind.read(data, self.endianness().is_little());
        Ok(())
    }
}

/// A named value of an enum field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant {
    /// Symbolic name
    pub name: String,
    /// Wire value
    pub value: i128,
}

/// An integer scalar restricted to a closed set of named values
#[derive(Debug, Clone)]
pub struct EnumField {
    scalar: Scalar,
    variants: Arc<[EnumVariant]>,
}

impl EnumField {
    /// Wrap an integer `scalar`; the live value starts at the first variant
    pub fn new<N: Into<String>>(
        scalar: Scalar,
        variants: impl IntoIterator<Item = (N, i128)>,
    ) -> Result<Self> {
        if scalar.kind().is_float() {
            return Err(LayoutError::InvalidEnum(format!(
                "enum scalar must be an integer format, got {}",
                scalar.kind().name()
            )));
        }
        let variants: Vec<EnumVariant> = variants
            .into_iter()
            .map(|(name, value)| EnumVariant {
                name: name.into(),
                value,
            })
            .collect();
        let first = variants
            .first()
            .ok_or_else(|| LayoutError::InvalidEnum("enum has no variants".to_string()))?
            .value;
        for variant in &variants {
            scalar
                .kind()
                .check(Value::Int(variant.value))
                .map_err(|e| LayoutError::InvalidEnum(format!("{}: {}", variant.name, e)))?;
        }

        let mut scalar = scalar;
        scalar.set_validator(Arc::new(SetValidator::new(
            variants.iter().map(|v| v.value),
        )));
        scalar.set_value(first)?;

        Ok(Self {
            scalar,
            variants: variants.into(),
        })
    }

    /// Select the initial variant by name
    pub fn with_variant(mut self, name: &str) -> Result<Self> {
        self.set_variant(name)?;
        Ok(self)
    }

    /// The wrapped scalar
    pub fn scalar(&self) -> &Scalar {
        &self.scalar
    }

    pub(crate) fn scalar_mut(&mut self) -> &mut Scalar {
        &mut self.scalar
    }

    /// Declared variants, in order
    pub fn variants(&self) -> &[EnumVariant] {
        &self.variants
    }

    /// Current wire value
    pub fn value(&self) -> &Value {
        self.scalar.value()
    }

    /// Assign a wire value; it must belong to a variant
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<()> {
        self.scalar.set_value(value)
    }

    /// Name of the current variant
    pub fn variant_name(&self) -> Option<&str> {
        let current = self.scalar.as_int()?;
        self.variants
            .iter()
            .find(|v| v.value == current)
            .map(|v| v.name.as_str())
    }

    /// Assign by variant name
    pub fn set_variant(&mut self, name: &str) -> Result<()> {
        let value = self
            .variants
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value)
            .ok_or_else(|| LayoutError::Validation(format!("'{}' is not a variant", name)))?;
        self.scalar.set_value(value)
    }

    /// Check membership of the current value
    pub fn validate(&self) -> Result<()> {
        self.scalar.validate()
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        self.scalar.size()
    }

    /// Append the encoding to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        self.scalar.encode_into(buf)
    }

    /// Decode exactly `size()` bytes; membership is checked by [`EnumField::validate`]
    pub fn decode(&mut self, data: &[u8]) -> Result<()> {
        self.scalar.decode(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths() {
        assert_eq!(Scalar::u8(0).size(), 1);
        assert_eq!(Scalar::i16(0).size(), 2);
        assert_eq!(Scalar::f32(0.0).size(), 4);
        assert_eq!(Scalar::u64(0).size(), 8);
        assert_eq!(Scalar::f64(0.0).encode().unwrap().len(), 8);
    }

    #[test]
    fn test_range_checks() {
        let mut s = Scalar::u8(0);
        assert!(matches!(
            s.set_value(256),
            Err(LayoutError::OutOfRange { .. })
        ));
        assert!(matches!(
            s.set_value(1.5),
            Err(LayoutError::TypeMismatch { .. })
        ));
        assert!(Scalar::new(ScalarKind::I8, -129).is_err());
        assert!(Scalar::new(ScalarKind::U64, u64::MAX).is_ok());
        assert!(Scalar::new(ScalarKind::F32, 1e300).is_err());

        let mut f = Scalar::f64(0.0);
        f.set_value(3).unwrap();
        assert_eq!(f.value(), &Value::Float(3.0));
    }

    #[test]
    fn test_f32_values_round_to_single_precision() {
        let mut s = Scalar::f32(0.0).with_endianness(Endianness::Big);
        s.set_value(0.1).unwrap();
        assert_eq!(s.value(), &Value::Float(0.1f32 as f64));

        let mut decoded = Scalar::f32(0.0).with_endianness(Endianness::Big);
        decoded.decode(&s.encode().unwrap()).unwrap();
        assert_eq!(decoded.value(), s.value());

        // Doubles keep full precision
        let mut d = Scalar::f64(0.0);
        d.set_value(0.1).unwrap();
        assert_eq!(d.value(), &Value::Float(0.1));
    }

    #[test]
    fn test_explicit_endianness() {
        let big = Scalar::u16(0x0102).with_endianness(Endianness::Big);
        assert_eq!(big.encode().unwrap().as_ref(), &[0x01, 0x02]);

        let little = Scalar::u16(0x0102).with_endianness(Endianness::Little);
        assert_eq!(little.encode().unwrap().as_ref(), &[0x02, 0x01]);

        let network = Scalar::i32(-2).with_endianness(Endianness::Network);
        assert_eq!(network.encode().unwrap().as_ref(), &[0xFF, 0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn test_decode() {
        let mut s = Scalar::u32(0).with_endianness(Endianness::Little);
        s.decode(&[0x78, 0x56, 0x34, 0x12]).unwrap();
        assert_eq!(s.as_int(), Some(0x1234_5678));

        assert!(matches!(
            s.decode(&[1, 2]),
            Err(LayoutError::IncompleteData {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_validator_on_assignment() {
        let mut s = Scalar::i32(5).with_validator(crate::validator::FunctionValidator::new(
            "gt4",
            |v| v.as_int().is_some_and(|x| x > 4),
        ));
        assert!(s.set_value(3).is_err());
        assert_eq!(s.as_int(), Some(5));
        s.set_value(9).unwrap();
        assert_eq!(s.as_int(), Some(9));
    }

    #[test]
    fn test_clone_shares_identity() {
        let a = Scalar::u16(0);
        let b = a.clone();
        let c = Scalar::u16(0);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_enum_membership() {
        let mut e = EnumField::new(Scalar::u32(0), [("a", 1), ("b", 2), ("c", 3)]).unwrap();
        assert_eq!(e.value(), &Value::Int(1));
        assert_eq!(e.variant_name(), Some("a"));

        e.set_variant("c").unwrap();
        assert_eq!(e.value(), &Value::Int(3));
        assert!(e.set_value(4).is_err());
        assert!(e.set_variant("z").is_err());
        assert_eq!(e.variant_name(), Some("c"));
    }

    #[test]
    fn test_enum_rejects_bad_definitions() {
        assert!(matches!(
            EnumField::new(Scalar::f32(0.0), [("a", 1)]),
            Err(LayoutError::InvalidEnum(_))
        ));
        assert!(EnumField::new(Scalar::u8(0), Vec::<(String, i128)>::new()).is_err());
        assert!(EnumField::new(Scalar::u8(0), [("big", 300)]).is_err());
    }
}
