//! Value validators
//!
//! A validator accepts or rejects a [`Value`]. Validators attach to scalars,
//! enums and sequences (where they apply to every element).

use crate::error::LayoutError;
use crate::value::Value;
use crate::Result;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Range, RangeInclusive};
use std::sync::Arc;

/// Accepts or rejects a value
pub trait Validator: Send + Sync + fmt::Debug {
    /// Returns `Err(LayoutError::Validation)` describing the rejection
    fn validate(&self, value: &Value) -> Result<()>;
}

/// Shared handle to a validator. Validators are immutable, so field copies share them.
pub type ValidatorRef = Arc<dyn Validator>;

/// Accepts exactly one value
#[derive(Debug, Clone)]
pub struct ExactValueValidator {
    expected: Value,
}

impl ExactValueValidator {
    /// Accept only `expected`
    pub fn new(expected: impl Into<Value>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

impl Validator for ExactValueValidator {
    fn validate(&self, value: &Value) -> Result<()> {
        if value.loosely_equals(&self.expected) {
            Ok(())
        } else {
            Err(LayoutError::Validation(format!(
                "Given value {} is not equal to {}",
                value, self.expected
            )))
        }
    }
}

/// Accepts numbers within a closed range, optionally on a step grid
#[derive(Debug, Clone)]
pub struct RangeValidator {
    min: Value,
    max: Value,
    step: Option<i128>,
}

impl RangeValidator {
    /// Accept `min <= value <= max`
    pub fn new(min: impl Into<Value>, max: impl Into<Value>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
            step: None,
        }
    }

    /// Additionally require `(value - min)` to be a multiple of `step`
    pub fn step(mut self, step: i128) -> Self {
        self.step = Some(step);
        self
    }

    fn contains(&self, value: &Value) -> bool {
        let in_bounds = matches!(
            compare(&self.min, value),
            Some(Ordering::Less | Ordering::Equal)
        ) && matches!(
            compare(value, &self.max),
            Some(Ordering::Less | Ordering::Equal)
        );
        if !in_bounds {
            return false;
        }
        match (self.step, &self.min, value) {
            (None, _, _) | (Some(0), _, _) => true,
            (Some(step), Value::Int(min), Value::Int(v)) => (v - min) % step == 0,
            (Some(step), min, v) => match (min.as_f64(), v.as_f64()) {
                (Some(min), Some(v)) => ((v - min) / step as f64).fract() == 0.0,
                _ => false,
            },
        }
    }
}

impl Validator for RangeValidator {
    fn validate(&self, value: &Value) -> Result<()> {
        if self.contains(value) {
            return Ok(());
        }
        let step = self
            .step
            .map(|s| format!(" (step {})", s))
            .unwrap_or_default();
        Err(LayoutError::Validation(format!(
            "Given value {} is not in [{}, {}]{}",
            value, self.min, self.max, step
        )))
    }
}

/// Numeric ordering; integers compare exactly, mixed pairs as `f64`
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// Accepts members of a closed set
#[derive(Debug, Clone)]
pub struct SetValidator {
    items: Vec<Value>,
}

impl SetValidator {
    /// Accept any of `items`
    pub fn new<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        let mut unique: Vec<Value> = Vec::new();
        for item in items {
            let item = item.into();
            if !unique.iter().any(|u| u.loosely_equals(&item)) {
                unique.push(item);
            }
        }
        Self { items: unique }
    }

    /// Whether `value` is a member
    pub fn contains(&self, value: &Value) -> bool {
        self.items.iter().any(|item| item.loosely_equals(value))
    }
}

impl Validator for SetValidator {
    fn validate(&self, value: &Value) -> Result<()> {
        if self.contains(value) {
            return Ok(());
        }
        Err(LayoutError::Validation(format!(
            "Given value {} is not in {}",
            value,
            Value::List(self.items.clone())
        )))
    }
}

type Predicate = dyn Fn(&Value) -> bool + Send + Sync;

/// Accepts values for which a predicate returns true
#[derive(Clone)]
pub struct FunctionValidator {
    name: String,
    predicate: Arc<Predicate>,
}

impl FunctionValidator {
    /// Wrap `predicate`; `name` appears in rejection messages
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }
}

impl fmt::Debug for FunctionValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValidator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Validator for FunctionValidator {
    fn validate(&self, value: &Value) -> Result<()> {
        if (self.predicate)(value) {
            Ok(())
        } else {
            Err(LayoutError::Validation(format!(
                "Calling {}({}) returned false",
                self.name, value
            )))
        }
    }
}

/// Applies an inner validator to every element of a list
#[derive(Debug, Clone)]
pub struct SequenceValidator {
    inner: ValidatorRef,
}

impl SequenceValidator {
    /// Validate each element with `inner`
    pub fn new(inner: ValidatorRef) -> Self {
        Self { inner }
    }
}

impl Validator for SequenceValidator {
    fn validate(&self, value: &Value) -> Result<()> {
        match value {
            Value::List(items) => items.iter().try_for_each(|item| self.inner.validate(item)),
            single => self.inner.validate(single),
        }
    }
}

/// Conversion of literals into validators.
///
/// A single number means "exactly this value", a range is a range check, a
/// vector or array of numbers is a membership set, and any [`Validator`]
/// passes through unchanged.
pub trait IntoValidator {
    /// Build the validator
    fn into_validator(self) -> ValidatorRef;
}

impl IntoValidator for ValidatorRef {
    fn into_validator(self) -> ValidatorRef {
        self
    }
}

impl<V: Validator + 'static> IntoValidator for V {
    fn into_validator(self) -> ValidatorRef {
        Arc::new(self)
    }
}

macro_rules! literal_validators {
    ($($t:ty),*) => {
        $(
            impl IntoValidator for $t {
                fn into_validator(self) -> ValidatorRef {
                    Arc::new(ExactValueValidator::new(self))
                }
            }

            impl IntoValidator for Range<$t> {
                fn into_validator(self) -> ValidatorRef {
                    Arc::new(RangeValidator::new(self.start, self.end as i128 - 1))
                }
            }

            impl IntoValidator for RangeInclusive<$t> {
                fn into_validator(self) -> ValidatorRef {
                    let (min, max) = self.into_inner();
                    Arc::new(RangeValidator::new(min, max))
                }
            }

            impl IntoValidator for Vec<$t> {
                fn into_validator(self) -> ValidatorRef {
                    Arc::new(SetValidator::new(self))
                }
            }

            impl<const N: usize> IntoValidator for [$t; N] {
                fn into_validator(self) -> ValidatorRef {
                    Arc::new(SetValidator::new(self))
                }
            }
        )*
    };
}

literal_validators!(i32, i64, u64);

impl IntoValidator for f64 {
    fn into_validator(self) -> ValidatorRef {
        Arc::new(ExactValueValidator::new(self))
    }
}

/// Convert an optional literal; `None` means "no validation"
pub fn as_validator<T: IntoValidator>(literal: Option<T>) -> Option<ValidatorRef> {
    literal.map(IntoValidator::into_validator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_value() {
        let v = 5i32.into_validator();
        assert!(v.validate(&Value::Int(5)).is_ok());
        assert!(v.validate(&Value::Float(5.0)).is_ok());
        assert!(matches!(
            v.validate(&Value::Int(4)),
            Err(LayoutError::Validation(_))
        ));
    }

    #[test]
    fn test_ranges() {
        let half_open = (0i32..3).into_validator();
        assert!(half_open.validate(&Value::Int(2)).is_ok());
        assert!(half_open.validate(&Value::Int(3)).is_err());

        let closed = (0i64..=3).into_validator();
        assert!(closed.validate(&Value::Int(3)).is_ok());
        assert!(closed.validate(&Value::Int(-1)).is_err());

        let stepped = RangeValidator::new(0, 28).step(2);
        assert!(stepped.validate(&Value::Int(14)).is_ok());
        assert!(stepped.validate(&Value::Int(15)).is_err());

        let floats = RangeValidator::new(0.0, 1.0);
        assert!(floats.validate(&Value::Float(0.5)).is_ok());
        assert!(floats.validate(&Value::Float(1.5)).is_err());
    }

    #[test]
    fn test_set_membership() {
        let v = vec![1i32, 2, 3].into_validator();
        assert!(v.validate(&Value::Int(2)).is_ok());
        assert!(v.validate(&Value::Int(4)).is_err());
    }

    #[test]
    fn test_predicate() {
        let v = FunctionValidator::new("greater_than_4", |v| v.as_f64().is_some_and(|x| x > 4.0));
        assert!(v.validate(&Value::Int(5)).is_ok());
        let err = v.validate(&Value::Int(3)).unwrap_err();
        assert!(err.to_string().contains("greater_than_4"));
    }

    #[test]
    fn test_sequence_wrapper() {
        let v = SequenceValidator::new(5i32.into_validator());
        assert!(v.validate(&Value::from(vec![5u8, 5, 5])).is_ok());
        assert!(v.validate(&Value::from(vec![5u8, 5, 4])).is_err());
        assert!(v.validate(&Value::List(vec![])).is_ok());
    }

    #[test]
    fn test_optional_literal() {
        assert!(as_validator::<i32>(None).is_none());
        assert!(as_validator(Some(0i32..10)).is_some());
    }
}
