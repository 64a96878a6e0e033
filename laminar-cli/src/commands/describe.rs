use crate::description::Registry;
use anyhow::Result;
use colored::*;
use laminar_core::Schema;
use std::fmt::Write;
use tracing::info;

pub fn execute(schemas: &str, name: Option<&str>) -> Result<()> {
    info!("Describing schemas from: {}", schemas);

    let registry = Registry::load(schemas)?;
    let text = render(&registry, name)?;
    if text.is_empty() {
        println!("{} No schemas defined", "✗".red());
        return Ok(());
    }
    print!("{}", text);
    println!("{} Described {} schema(s)", "✓".green(), count(&registry, name));
    Ok(())
}

fn count(registry: &Registry, name: Option<&str>) -> usize {
    match name {
        Some(_) => 1,
        None => registry.iter().count(),
    }
}

/// Field tables for every schema in `registry`, or only `name`
pub fn render(registry: &Registry, name: Option<&str>) -> Result<String> {
    let mut out = String::new();
    match name {
        Some(name) => render_schema(&mut out, registry.get(name)?)?,
        None => {
            for schema in registry.iter() {
                render_schema(&mut out, schema)?;
            }
        }
    }
    Ok(out)
}

fn render_schema(out: &mut String, schema: &Schema) -> Result<()> {
    writeln!(out, "\n=== {} ===", schema.name())?;
    if !schema.parents().is_empty() {
        let parents: Vec<&str> = schema.parents().iter().map(|p| p.name()).collect();
        writeln!(out, "Extends:     {}", parents.join(", "))?;
    }
    if let Some(endianness) = schema.endianness() {
        writeln!(out, "Endianness:  {:?}", endianness)?;
    }
    writeln!(out, "Size:        {} bytes", schema.size())?;
    writeln!(out, "{:>3}  {:<16} {:<12} {:>6}", "#", "field", "kind", "size")?;
    for (index, (name, field)) in schema.fields().enumerate() {
        let footer = if schema.is_footer_field(name) {
            "  (footer)"
        } else {
            ""
        };
        writeln!(
            out,
            "{:>3}  {:<16} {:<12} {:>6}{}",
            index,
            name,
            field.kind_name(),
            field.size(),
            footer
        )?;
    }
    Ok(())
}
