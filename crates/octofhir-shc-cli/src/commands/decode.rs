use anyhow::{Context, Result};
use octofhir_shc::Scanner;
use serde_json::Value;

use crate::output::print_json;

/// Prints the decoded credential without checking its signature.
pub fn decode(scanner: &Scanner, code: &str) -> Result<()> {
    let decoded = scanner.decode(code.trim())?;
    let value: Value =
        serde_json::from_str(&decoded.card.json).context("Decoded payload is not JSON")?;
    print_json(&value)
}
