use crate::description::{apply_json, Registry};
use anyhow::{Context, Result};
use bytes::Bytes;
use colored::*;
use serde_json::Value as Json;
use std::fs;
use tracing::info;

pub fn execute(schemas: &str, schema: &str, values: &str, output: &str) -> Result<()> {
    info!("Encoding {} to {}", schema, output);

    let registry = Registry::load(schemas)?;
    let values = parse_values(values)?;
    let encoded = encode(&registry, schema, &values)?;

    fs::write(output, &encoded)
        .with_context(|| format!("Failed to write output file: {}", output))?;

    println!(
        "{} Wrote {} bytes to {}",
        "✓".green(),
        encoded.len(),
        output
    );
    Ok(())
}

/// Inline JSON, or `@path` to read it from a file
fn parse_values(values: &str) -> Result<Json> {
    let text = match values.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read values file: {}", path))?,
        None => values.to_string(),
    };
    serde_json::from_str(&text).context("Failed to parse values JSON")
}

/// Build an instance of `schema`, apply `values` and encode it
pub fn encode(registry: &Registry, schema: &str, values: &Json) -> Result<Bytes> {
    let mut instance = registry.get(schema)?.instance();
    apply_json(&mut instance, values)?;
    instance
        .encode()
        .with_context(|| format!("Failed to encode {}", schema))
}
