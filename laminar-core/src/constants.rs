//! Constants and limits for the layout engine

/// Accessor names of the field contract.
///
/// A struct used as a nested field or as a sequence element must not declare
/// a field with one of these names.
pub const RESERVED_FIELD_NAMES: &[&str] = &["value", "size", "validator"];

/// Maximum number of sequence elements reserved up front while decoding.
///
/// Element counts come from already-decoded length fields and can be
/// arbitrarily large on hostile input; beyond this budget the item list grows
/// as bytes actually arrive.
pub const MAX_PREALLOCATED_ELEMENTS: usize = 4096;

/// Width in bytes of the CRC32C checksum meta-field
pub const CRC32C_SIZE: usize = 4;

/// Maximum number of bytes reserved up front for a single stream read
pub const MAX_PREALLOCATED_BYTES: usize = 64 * 1024;
