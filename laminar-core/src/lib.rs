//! # Laminar Core
//!
//! Declarative binary layouts: describe a byte structure as a typed schema,
//! encode instances to bytes and decode bytes (or a stream) back into
//! instances with bit-exact fidelity. Schemas compose into layered messages
//! whose derived fields (lengths, opcodes, checksums) maintain themselves.
//!
//! ## Modules
//!
//! - `constants`: Reserved names and decoding limits
//! - `endianness`: Byte order selection and the process-wide default
//! - `value`: Dynamic field values
//! - `validator`: Value validators and literal conversions
//! - `scalar`: Fixed-width numbers and enums
//! - `sequence`: Arrays and length-bound vectors
//! - `field`: The field sum type
//! - `schema`: Schema definitions and the field-table builder
//! - `structure`: Struct instances
//! - `decoder`: Byte sources and struct decoding
//! - `meta`: Derived fields and opcode tables
//! - `message`: Layered messages and opcode-driven decoding
//!
//! ## Example
//!
//! ```
//! use laminar_core::{Endianness, Scalar, Schema, Vector};
//!
//! let len = Scalar::u8(0);
//! let packet = Schema::builder("Packet")
//!     .endianness(Endianness::Big)
//!     .field("kind", Scalar::u16(7))
//!     .field("len", len.clone())
//!     .field("data", Vector::new(&len, Scalar::u8(0)))
//!     .build()?;
//!
//! let mut p = packet.instance();
//! p.set("data", vec![1u8, 2, 3])?;
//! let bytes = p.encode()?;
//! assert_eq!(bytes.as_ref(), &[0, 7, 3, 1, 2, 3]);
//! assert_eq!(packet.decode(&bytes)?, p);
//! # Ok::<(), laminar_core::LayoutError>(())
//! ```

#![warn(missing_docs)]

pub mod constants;
pub mod decoder;
pub mod endianness;
pub mod error;
pub mod field;
pub mod message;
pub mod meta;
pub mod scalar;
pub mod schema;
pub mod sequence;
pub mod structure;
pub mod validator;
pub mod value;

// Re-export commonly used types
pub use decoder::{ByteSource, SliceSource, StreamSource};
pub use endianness::{default_endianness, set_default_endianness, Endianness};
pub use error::{ErrorKind, LayoutError};
pub use field::Field;
pub use message::{IntoLayers, Layer, LayerKey, Message};
pub use meta::{MetaCompute, MetaContext, MetaField, MetaKind, OpcodeTable};
pub use scalar::{EnumField, EnumVariant, FieldId, Scalar, ScalarKind};
pub use schema::{DecodeHook, PostEncodeHook, PreEncodeHook, Schema, SchemaBuilder};
pub use sequence::{Array, LengthSource, Vector};
pub use structure::{InstanceId, Struct};
pub use validator::{IntoValidator, Validator, ValidatorRef};
pub use value::Value;

/// Result type alias for layout operations
pub type Result<T> = core::result::Result<T, LayoutError>;
