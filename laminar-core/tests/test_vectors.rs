//! Byte-exact test vectors
//!
//! Each vector pins the wire image of a small layout so that changes to
//! field ordering, byte order or meta-field computation show up as diffs.

use laminar_core::{
    Array, EnumField, Endianness, LayoutError, Message, MetaField, OpcodeTable, Scalar, Schema, Vector,
};
use std::sync::Arc;

fn check(schema: &Arc<Schema>, expected_hex: &str, set: &[(&str, laminar_core::Value)]) {
    let mut s = schema.instance();
    for (name, value) in set {
        s.set(name, value.clone()).unwrap();
    }
    let encoded = s.encode().unwrap();
    assert_eq!(hex::encode(&encoded), expected_hex, "schema {}", schema.name());
    let decoded = schema.decode(&hex::decode(expected_hex).unwrap()).unwrap();
    assert_eq!(decoded, s);
}

#[test]
fn vector_scalar_widths_big_endian() {
    let schema = Schema::builder("Widths")
        .endianness(Endianness::Big)
        .field("a", Scalar::u8(0x01))
        .field("b", Scalar::i16(-2))
        .field("c", Scalar::u32(0xDEAD_BEEF))
        .field("d", Scalar::i64(-1))
        .build()
        .unwrap();
    check(&schema, "01fffedeadbeefffffffffffffffff", &[]);
}

#[test]
fn vector_scalar_widths_little_endian() {
    let schema = Schema::builder("WidthsLe")
        .endianness(Endianness::Little)
        .field("a", Scalar::u16(0x0102))
        .field("b", Scalar::u64(0x0102_0304_0506_0708))
        .build()
        .unwrap();
    check(&schema, "02010807060504030201", &[]);
}

#[test]
fn vector_floats() {
    let schema = Schema::builder("Floats")
        .endianness(Endianness::Network)
        .field("f", Scalar::f32(1.0))
        .field("d", Scalar::f64(-2.5))
        .build()
        .unwrap();
    check(&schema, "3f800000c004000000000000", &[]);
}

#[test]
fn vector_enum_and_filled_array() {
    let schema = Schema::builder("Mixed")
        .endianness(Endianness::Big)
        .field(
            "state",
            EnumField::new(Scalar::u16(0), [("off", 0x10), ("on", 0x20)]).unwrap(),
        )
        .field("pad", Array::new(4, Scalar::u8(0xAA)).with_fill())
        .build()
        .unwrap();
    check(&schema, "0010aaaaaaaa", &[]);
    check(
        &schema,
        "00200102aaaa",
        &[("state", 0x20.into()), ("pad", vec![1u8, 2].into())],
    );
}

#[test]
fn vector_enum_rejects_unknown_wire_value() {
    let schema = Schema::builder("State")
        .endianness(Endianness::Big)
        .field(
            "state",
            EnumField::new(Scalar::u16(0), [("off", 0x10), ("on", 0x20)]).unwrap(),
        )
        .build()
        .unwrap();
    assert!(schema.decode(&hex::decode("0020").unwrap()).is_ok());

    let err = schema.decode(&hex::decode("0030").unwrap()).unwrap_err();
    assert!(matches!(err.root(), LayoutError::Validation(_)));
    assert!(matches!(err, LayoutError::Field { ref field, .. } if field == "state"));
}

#[test]
fn vector_length_prefixed_payload() {
    let len = Scalar::u16(0);
    let schema = Schema::builder("Tlv")
        .endianness(Endianness::Big)
        .field("tag", Scalar::u8(0x7F))
        .field("len", len.clone())
        .field("value", Vector::new(&len, Scalar::u8(0)))
        .build()
        .unwrap();
    check(&schema, "7f0000", &[]);
    check(&schema, "7f0003616263", &[("value", b"abc".to_vec().into())]);
}

#[test]
fn vector_header_body_message() {
    let ping = Schema::builder("Ping")
        .endianness(Endianness::Big)
        .field("seq", Scalar::u32(1))
        .build()
        .unwrap();
    let pong = Schema::builder("Pong")
        .field("ok", Scalar::u8(1))
        .build()
        .unwrap();
    let table = OpcodeTable::new([(ping.clone(), 0x01), (pong.clone(), 0x02)]).unwrap();
    let header = Schema::builder("Header")
        .endianness(Endianness::Big)
        .field("magic", Scalar::u16(0x4C4D))
        .field("opcode", MetaField::opcode(Scalar::u8(0), table).unwrap())
        .field("length", MetaField::exclusive_length(Scalar::u16(0)))
        .build()
        .unwrap();
    let trailer = Schema::builder("Trailer")
        .endianness(Endianness::Big)
        .field("crc", MetaField::checksum(Scalar::u32(0)))
        .build()
        .unwrap();

    let message = (header.instance() / ping.instance() / trailer.instance()).unwrap();
    let encoded = message.encode().unwrap();
    let crc = crc32c::crc32c(&hex::decode("4c4d01000800000001").unwrap());
    assert_eq!(
        hex::encode(&encoded),
        format!("4c4d01000800000001{:08x}", crc)
    );

    let decoded = Message::from_bytes(&header, &encoded, &[trailer.clone()]).unwrap();
    assert_eq!(decoded, message);
    decoded.verify().unwrap();
}
