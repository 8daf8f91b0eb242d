pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Unwrap an `{ "value": .., "status": .. }` estimate to its value and a
/// degraded flag. Other values pass through unchanged.
pub fn unwrap_estimate(value: &Value) -> (&Value, bool) {
    match value {
        Value::Object(map) if map.contains_key("value") && map.contains_key("status") => {
            let degraded = map.get("status").and_then(Value::as_str) == Some("degraded");
            (map.get("value").unwrap_or(value), degraded)
        }
        _ => (value, false),
    }
}
