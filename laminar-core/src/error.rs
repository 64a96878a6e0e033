//! Error types for layout operations

use std::io;

/// Broad category of a [`LayoutError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised while building a schema
    Schema,
    /// A value does not fit, fails validation, or bytes cannot be decoded
    Value,
    /// A message lookup found nothing (or not enough)
    Lookup,
    /// The API was used in a way the schema does not allow
    Usage,
}

/// Errors that can occur while defining, building, encoding or decoding layouts
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    /// A field name appears more than once across the inheritance chain
    #[error("Field '{field}' was defined more than once in schema '{schema}'")]
    DuplicateField {
        /// Schema being built
        schema: String,
        /// The repeated field name
        field: String,
    },

    /// A vector's length source does not match any field of the schema
    #[error("Unable to resolve the length field of vector '{field}' in schema '{schema}'")]
    UnresolvedLengthField {
        /// Schema being built
        schema: String,
        /// The vector field
        field: String,
    },

    /// A vector's length field exists but cannot carry a length
    #[error("Field '{length_field}' cannot be the length of vector '{field}': {reason}")]
    InvalidLengthField {
        /// The vector field
        field: String,
        /// The referenced length field
        length_field: String,
        /// Why it was rejected
        reason: String,
    },

    /// A nested or sequenced struct declares a reserved accessor name
    #[error("'{name}' is an invalid name for a field of nested schema '{schema}'")]
    ReservedFieldName {
        /// The nested schema
        schema: String,
        /// The reserved name it declares
        name: String,
    },

    /// Two schemas share the same opcode
    #[error("Opcode {0} appears more than once in the opcode table")]
    DuplicateOpcode(i128),

    /// A schema appears more than once in an opcode table
    #[error("Schema '{0}' appears more than once in the opcode table")]
    DuplicateOpcodeSchema(String),

    /// A field's default value is rejected by its own validator
    #[error("Default value of field '{field}' is invalid: {reason}")]
    InvalidDefault {
        /// The field whose default was rejected
        field: String,
        /// Validator message
        reason: String,
    },

    /// A decode hook targets a field the schema does not declare
    #[error("Decode hook registered for unknown field '{0}'")]
    UnknownHookField(String),

    /// An enum definition is unusable
    #[error("Invalid enum: {0}")]
    InvalidEnum(String),

    /// A value lies outside what the binary format can represent
    #[error("Value {value} is out of range for {kind}")]
    OutOfRange {
        /// Offending value, rendered
        value: String,
        /// Binary format name
        kind: &'static str,
    },

    /// A value has the wrong shape for the field
    #[error("Expected {expected}, got {actual}")]
    TypeMismatch {
        /// What the field accepts
        expected: &'static str,
        /// What was supplied, rendered
        actual: String,
    },

    /// A validator rejected a value
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A sequence assignment is longer than the array capacity
    #[error("Length will be too long: capacity is {capacity} but {actual} items were given")]
    CapacityExceeded {
        /// Array capacity
        capacity: usize,
        /// Items supplied
        actual: usize,
    },

    /// A sequence assignment is shorter than an array without fill allows
    #[error("Array needs exactly {capacity} items but {actual} were given")]
    Underfilled {
        /// Array capacity
        capacity: usize,
        /// Items supplied
        actual: usize,
    },

    /// Not enough bytes to decode
    #[error("Incomplete data: expected {expected} bytes, got {actual}")]
    IncompleteData {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// IO error from a stream reader
    #[error("IO error: {0}")]
    Io(String),

    /// A placeholder was encoded or decoded before being replaced
    #[error("Placeholders cannot be encoded or decoded")]
    Placeholder,

    /// An error attributed to a named field
    #[error("Field '{field}': {source}")]
    Field {
        /// The field being processed
        field: String,
        /// Underlying error
        source: Box<LayoutError>,
    },

    /// A header carries an opcode its table does not know
    #[error("Opcode {code} of schema '{schema}' does not map to any schema")]
    UnknownOpcode {
        /// Header schema
        schema: String,
        /// The decoded opcode
        code: i128,
    },

    /// A stored meta-field value disagrees with the message around it
    #[error("Meta-field '{field}' of layer {layer} holds {stored}, expected {expected}")]
    MetaMismatch {
        /// Layer index
        layer: usize,
        /// Field name
        field: String,
        /// Value found in the layer
        stored: String,
        /// Value implied by the message
        expected: String,
    },

    /// No layer matches a lookup key
    #[error("Couldn't find any layer matching {0}")]
    LayerNotFound(String),

    /// Fewer layers match than the requested occurrence needs
    #[error("Found only {found} occurrences of {key}, but expected to find at least {requested}")]
    TooFewMatches {
        /// Lookup key, rendered
        key: String,
        /// Matches found
        found: usize,
        /// Matches needed
        requested: usize,
    },

    /// The layer following an opcode field has no code in its table
    #[error("Schema '{0}' has no opcode in the table")]
    NoOpcodeForSchema(String),

    /// Opcode-driven decoding was asked for with a header lacking an opcode field
    #[error("Schema '{0}' has no opcode field")]
    MissingOpcodeField(String),

    /// A header declares more than one opcode field
    #[error("Schema '{0}' has more than one opcode field")]
    MultipleOpcodeFields(String),

    /// Access to a field the schema does not declare
    #[error("Schema '{schema}' has no field named '{field}'")]
    UnknownField {
        /// Schema of the instance
        schema: String,
        /// Requested name
        field: String,
    },

    /// A sequence operation was applied to a non-sequence field
    #[error("Field '{0}' is not a sequence")]
    NotASequence(String),
}

impl LayoutError {
    /// The category this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            LayoutError::DuplicateField { .. }
            | LayoutError::UnresolvedLengthField { .. }
            | LayoutError::InvalidLengthField { .. }
            | LayoutError::ReservedFieldName { .. }
            | LayoutError::DuplicateOpcode(_)
            | LayoutError::DuplicateOpcodeSchema(_)
            | LayoutError::InvalidDefault { .. }
            | LayoutError::UnknownHookField(_)
            | LayoutError::InvalidEnum(_) => ErrorKind::Schema,

            LayoutError::OutOfRange { .. }
            | LayoutError::TypeMismatch { .. }
            | LayoutError::Validation(_)
            | LayoutError::CapacityExceeded { .. }
            | LayoutError::Underfilled { .. }
            | LayoutError::IncompleteData { .. }
            | LayoutError::Io(_)
            | LayoutError::Placeholder
            | LayoutError::UnknownOpcode { .. }
            | LayoutError::MetaMismatch { .. } => ErrorKind::Value,

            LayoutError::Field { source, .. } => source.kind(),

            LayoutError::LayerNotFound(_)
            | LayoutError::TooFewMatches { .. }
            | LayoutError::NoOpcodeForSchema(_) => ErrorKind::Lookup,

            LayoutError::MissingOpcodeField(_)
            | LayoutError::MultipleOpcodeFields(_)
            | LayoutError::UnknownField { .. }
            | LayoutError::NotASequence(_) => ErrorKind::Usage,
        }
    }

    /// Attribute this error to a field, unless it already names one
    pub(crate) fn in_field(self, field: &str) -> Self {
        match self {
            LayoutError::Field { .. } => self,
            other => LayoutError::Field {
                field: field.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Strip any field attribution and return the underlying error
    pub fn root(&self) -> &LayoutError {
        match self {
            LayoutError::Field { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<io::Error> for LayoutError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => LayoutError::IncompleteData {
                expected: 0,
                actual: 0,
            },
            _ => LayoutError::Io(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_wrapping_keeps_kind() {
        let err = LayoutError::Validation("too small".into()).in_field("x");
        assert_eq!(err.kind(), ErrorKind::Value);
        assert_eq!(err.root(), &LayoutError::Validation("too small".into()));

        // Wrapping twice keeps the innermost attribution
        let again = err.clone().in_field("outer");
        assert_eq!(again, err);
    }

    #[test]
    fn test_io_eof_is_incomplete_data() {
        let err: LayoutError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, LayoutError::IncompleteData { .. }));
        assert_eq!(err.kind(), ErrorKind::Value);
    }
}
