use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

use laminar_cli::commands::{decode, describe, encode};
use laminar_cli::Registry;

const SCHEMAS: &str = r#"{
  "schemas": [
    { "name": "Ping", "endianness": "big",
      "fields": [ { "name": "seq", "type": "u16", "default": 1 } ] },
    { "name": "Blob", "endianness": "big",
      "fields": [
        { "name": "len", "type": "u8" },
        { "name": "data", "type": "vector", "length_field": "len",
          "element": { "type": "u8" } }
      ] },
    { "name": "Header", "endianness": "big",
      "fields": [
        { "name": "op", "type": "opcode", "kind": "u8",
          "table": { "Ping": 3, "Blob": 4 } },
        { "name": "length", "type": "inclusive_length", "kind": "u8" }
      ] },
    { "name": "Tagged", "parents": ["Ping"], "endianness": "big",
      "fields": [
        { "name": "mode", "type": "enum", "kind": "u8",
          "variants": [ { "name": "off", "value": 0 }, { "name": "on", "value": 1 } ] }
      ] }
  ]
}"#;

fn write_schemas(dir: &Path) -> String {
    let path = dir.join("schemas.json");
    fs::write(&path, SCHEMAS).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn describe_lists_fields_in_order() {
    let td = tempdir().unwrap();
    let registry = Registry::load(write_schemas(td.path())).unwrap();

    let text = describe::render(&registry, Some("Tagged")).unwrap();
    assert!(text.contains("=== Tagged ==="));
    assert!(text.contains("Extends:     Ping"));
    let seq = text.find("seq").unwrap();
    let mode = text.find("mode").unwrap();
    assert!(seq < mode);

    let all = describe::render(&registry, None).unwrap();
    for name in ["Ping", "Blob", "Header", "Tagged"] {
        assert!(all.contains(&format!("=== {} ===", name)));
    }
}

#[test]
fn describe_unknown_schema_fails() {
    let td = tempdir().unwrap();
    let schemas = write_schemas(td.path());
    assert!(describe::execute(&schemas, Some("Missing")).is_err());
}

#[test]
fn encode_then_decode_struct() {
    let td = tempdir().unwrap();
    let schemas = write_schemas(td.path());
    let out_path = td.path().join("blob.bin");

    encode::execute(
        &schemas,
        "Blob",
        r#"{"data": [104, 105]}"#,
        out_path.to_str().unwrap(),
    )
    .unwrap();

    let bytes = fs::read(&out_path).unwrap();
    assert_eq!(bytes, vec![2, 104, 105]);

    let registry = Registry::load(&schemas).unwrap();
    let decoded = decode::decode(&registry, "Blob", &[], &bytes, false).unwrap();
    assert_eq!(decoded, json!({ "len": 2, "data": [104, 105] }));
}

#[test]
fn encode_enum_by_variant_name() {
    let td = tempdir().unwrap();
    let registry = Registry::load(write_schemas(td.path())).unwrap();

    let bytes = encode::encode(&registry, "Tagged", &json!({ "mode": "on" })).unwrap();
    assert_eq!(bytes.as_ref(), &[0, 1, 1]);

    assert!(encode::encode(&registry, "Tagged", &json!({ "mode": "dim" })).is_err());
}

#[test]
fn encode_values_from_file() {
    let td = tempdir().unwrap();
    let schemas = write_schemas(td.path());
    let values_path = td.path().join("values.json");
    let out_path = td.path().join("ping.bin");
    fs::write(&values_path, r#"{"seq": 513}"#).unwrap();

    encode::execute(
        &schemas,
        "Ping",
        &format!("@{}", values_path.display()),
        out_path.to_str().unwrap(),
    )
    .unwrap();
    assert_eq!(fs::read(&out_path).unwrap(), vec![2, 1]);
}

#[test]
fn decode_message_follows_opcode() {
    let td = tempdir().unwrap();
    let registry = Registry::load(write_schemas(td.path())).unwrap();

    let data = [4, 5, 2, 0xAA, 0xBB];
    let decoded = decode::decode(&registry, "Header", &[], &data, true).unwrap();
    assert_eq!(
        decoded,
        json!([
            { "op": 4, "length": 5 },
            { "len": 2, "data": [170, 187] }
        ])
    );
}

#[test]
fn decode_hex_input_file() {
    let td = tempdir().unwrap();
    let schemas = write_schemas(td.path());
    let in_path = td.path().join("ping.hex");
    fs::write(&in_path, "03 04\n00 07\n").unwrap();

    decode::execute(
        &schemas,
        "Header",
        &[],
        in_path.to_str().unwrap(),
        true,
        true,
    )
    .unwrap();
}

#[test]
fn decode_unknown_opcode_fails() {
    let td = tempdir().unwrap();
    let registry = Registry::load(write_schemas(td.path())).unwrap();

    let err = decode::decode(&registry, "Header", &[], &[9, 2], true).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to decode message"));
}

#[test]
fn decode_truncated_struct_fails() {
    let td = tempdir().unwrap();
    let registry = Registry::load(write_schemas(td.path())).unwrap();
    assert!(decode::decode(&registry, "Blob", &[], &[3, 1], false).is_err());
}
