use super::read_input;
use crate::description::Registry;
use anyhow::{Context, Result};
use laminar_core::Message;
use serde_json::Value as Json;
use std::sync::Arc;
use tracing::info;

pub fn execute(
    schemas: &str,
    schema: &str,
    extra: &[String],
    input: &str,
    hex: bool,
    message: bool,
) -> Result<()> {
    info!("Decoding {} as {}", input, schema);

    let registry = Registry::load(schemas)?;
    let data = read_input(input, hex)?;
    info!("Read {} bytes", data.len());

    let decoded = decode(&registry, schema, extra, &data, message)?;
    println!("{}", serde_json::to_string_pretty(&decoded)?);
    Ok(())
}

/// Decode `data` as one instance of `schema`, or as a message headed by it
pub fn decode(
    registry: &Registry,
    schema: &str,
    extra: &[String],
    data: &[u8],
    message: bool,
) -> Result<Json> {
    let header = registry.get(schema)?;

    if !message {
        let instance = header
            .decode(data)
            .with_context(|| format!("Failed to decode {}", schema))?;
        return Ok(serde_json::to_value(&instance)?);
    }

    let extra = extra
        .iter()
        .map(|name| registry.get(name).map(Arc::clone))
        .collect::<Result<Vec<_>>>()?;
    let decoded = Message::from_bytes(header, data, &extra)
        .with_context(|| format!("Failed to decode message headed by {}", schema))?;
    info!("Decoded {} layer(s)", decoded.len());
    Ok(serde_json::to_value(&decoded)?)
}
