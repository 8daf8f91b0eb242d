use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::unwrap_estimate;

/// Format output as a table using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => match map.get("result") {
            Some(result) => print_envelope(result, map),
            None => print_fields(map),
        },
        Value::Array(arr) => print_rows(arr),
        _ => println!("{}", value),
    }
}

fn print_envelope(result: &Value, envelope: &Map<String, Value>) {
    match result {
        Value::Object(fields) => print_fields(fields),
        Value::Array(rows) => print_rows(rows),
        other => println!("{}", format_cell(other)),
    }

    // Symbol-aligned comparisons read better as their own table
    if let Some(Value::Array(rows)) = result.get("prior_vs_posterior") {
        println!();
        print_rows(rows);
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }

    if let Some(Value::String(methodology)) = envelope.get("methodology") {
        println!("\nMethodology: {}", methodology);
    }
}

fn print_fields(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        if key == "prior_vs_posterior" {
            continue;
        }
        builder.push_record([key.as_str(), &format_cell(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_rows(arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            println!("{}", format_cell(item));
        }
        return;
    };

    let headers: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(&headers);
    for item in arr.iter().filter_map(Value::as_object) {
        let row: Vec<String> = headers
            .iter()
            .map(|h| item.get(h).map(format_cell).unwrap_or_default())
            .collect();
        builder.push_record(row);
    }
    println!("{}", Table::from(builder));
}

fn format_cell(value: &Value) -> String {
    let (inner, degraded) = unwrap_estimate(value);
    let text = match inner {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) if arr.iter().all(|v| !v.is_array() && !v.is_object()) => arr
            .iter()
            .map(format_cell)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(arr) => format!("[{} rows]", arr.len()),
        Value::Object(_) => serde_json::to_string(inner).unwrap_or_default(),
    };
    if degraded {
        format!("{} (degraded)", text)
    } else {
        text
    }
}
