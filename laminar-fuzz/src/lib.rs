//! Fuzzing entry points for laminar-core decoders
//!
//! To use with cargo-fuzz:
//! 1. Install cargo-fuzz: cargo install cargo-fuzz
//! 2. Call these functions from fuzz targets, e.g. `cargo fuzz run fuzz_message`

use laminar_core::{
    Array, Endianness, Message, MetaField, OpcodeTable, Scalar, Schema, Vector,
};
use std::io::Cursor;
use std::sync::{Arc, OnceLock};

struct Layouts {
    record: Arc<Schema>,
    header: Arc<Schema>,
    trailer: Arc<Schema>,
}

fn build() -> laminar_core::Result<Layouts> {
    let point = Schema::builder("Point")
        .endianness(Endianness::Little)
        .field("x", Scalar::i32(0))
        .field("y", Scalar::i32(0))
        .build()?;
    let record = Schema::builder("Record")
        .endianness(Endianness::Big)
        .field("count", Scalar::u16(0))
        .field("points", Vector::new("count", point.instance()))
        .field("tag", Array::new(3, Scalar::u8(0)))
        .field("weight", Scalar::f32(0.0))
        .build()?;
    let table = OpcodeTable::new([(record.clone(), 1)])?;
    let header = Schema::builder("Header")
        .endianness(Endianness::Big)
        .field("opcode", MetaField::opcode(Scalar::u8(0), table)?)
        .field("length", MetaField::inclusive_length(Scalar::u32(0)))
        .build()?;
    let trailer = Schema::builder("Trailer")
        .field("crc", MetaField::checksum(Scalar::u32(0)))
        .build()?;
    Ok(Layouts {
        record,
        header,
        trailer,
    })
}

fn layouts() -> Option<&'static Layouts> {
    static LAYOUTS: OnceLock<Option<Layouts>> = OnceLock::new();
    LAYOUTS.get_or_init(|| build().ok()).as_ref()
}

/// Decode a struct from a flat buffer and from a stream
pub fn fuzz_decode_struct(data: &[u8]) {
    let Some(layouts) = layouts() else {
        return;
    };

    // Should either succeed or return an error, never panic
    if let Ok(record) = layouts.record.decode(data) {
        let _ = record.encode();
    }
    let _ = layouts
        .record
        .decode_from_reader(&mut Cursor::new(data.to_vec()));
}

/// Decode an opcode-dispatched message and verify its meta-fields
pub fn fuzz_message(data: &[u8]) {
    let Some(layouts) = layouts() else {
        return;
    };

    let extra = [layouts.trailer.clone()];
    if let Ok(message) = Message::from_bytes(&layouts.header, data, &extra) {
        let _ = message.verify();
        let _ = message.encode();
    }
    let _ = Message::from_reader(&layouts.header, &mut Cursor::new(data.to_vec()), &extra);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_build() {
        assert!(layouts().is_some());
    }

    #[test]
    fn test_fuzz_decode_struct_empty() {
        fuzz_decode_struct(&[]);
    }

    #[test]
    fn test_fuzz_decode_struct_huge_count() {
        fuzz_decode_struct(&[0xFF, 0xFF, 0x01, 0x02]);
    }

    #[test]
    fn test_fuzz_message_empty() {
        fuzz_message(&[]);
    }

    #[test]
    fn test_fuzz_message_random() {
        fuzz_message(&[0x01, 0x00, 0x00, 0x00, 0x20, 0x00, 0x02]);
        fuzz_message(&[0xFF; 1024]);
    }
}
