use serde_json::Value;
use std::io::{self, Read};

/// Read a JSON document from stdin when data is piped in.
/// Returns `None` for an interactive terminal or empty input.
pub fn read_stdin() -> Result<Option<Value>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;

    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    Ok(Some(serde_json::from_str(trimmed)?))
}
