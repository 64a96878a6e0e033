//! Subcommand implementations

pub mod decode;
pub mod describe;
pub mod encode;

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Read};

/// Read `input` fully; `-` means stdin. With `hex`, the content is hex text.
pub(crate) fn read_input(input: &str, hex: bool) -> Result<Vec<u8>> {
    let data = if input == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        fs::read(input).with_context(|| format!("Failed to read input file: {}", input))?
    };

    if !hex {
        return Ok(data);
    }
    let text = String::from_utf8(data).context("Hex input is not valid UTF-8")?;
    let digits: String = text.split_whitespace().collect();
    hex::decode(&digits).context("Failed to parse hex input")
}
