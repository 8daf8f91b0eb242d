use serde_json::{Map, Value};
use std::io;

use super::unwrap_estimate;

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write output as CSV to stdout.
///
/// Black-Litterman results print their per-symbol comparison as rows. Other
/// envelopes print as `field,value` pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match value {
        Value::Object(map) => match map.get("result") {
            Some(Value::Object(result)) => match result.get("prior_vs_posterior") {
                Some(Value::Array(rows)) => write_rows(&mut wtr, rows),
                _ => write_fields(&mut wtr, result),
            },
            Some(Value::Array(rows)) => write_rows(&mut wtr, rows),
            _ => write_fields(&mut wtr, map),
        },
        Value::Array(arr) => write_rows(&mut wtr, arr),
        _ => {
            let _ = wtr.write_record([&format_csv_value(value)]);
        }
    }

    let _ = wtr.flush();
}

fn write_fields(wtr: &mut StdoutWriter<'_>, map: &Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
    }
}

fn write_rows(wtr: &mut StdoutWriter<'_>, arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
        return;
    };

    let headers: Vec<&str> = first.keys().map(String::as_str).collect();
    let _ = wtr.write_record(&headers);
    for item in arr.iter().filter_map(Value::as_object) {
        let row: Vec<String> = headers
            .iter()
            .map(|h| item.get(*h).map(format_csv_value).unwrap_or_default())
            .collect();
        let _ = wtr.write_record(&row);
    }
}

fn format_csv_value(value: &Value) -> String {
    let (inner, degraded) = unwrap_estimate(value);
    let text = match inner {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(inner).unwrap_or_default(),
    };
    if degraded {
        format!("{} (degraded)", text)
    } else {
        text
    }
}
