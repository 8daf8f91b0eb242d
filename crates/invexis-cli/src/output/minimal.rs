use serde_json::Value;

use super::unwrap_estimate;

// Most useful single answer per command, in order of preference
const PRIORITY_KEYS: [&str; 7] = [
    "cache_key",
    "optimal_weights",
    "posterior_returns",
    "statistics",
    "implied_returns",
    "ending_values",
    "covariance",
];

/// Print just the key answer value from the output.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Value::Object(map) = result {
        for key in PRIORITY_KEYS {
            if let Some(val) = map.get(key).filter(|v| !v.is_null()) {
                println!("{}", format_minimal(val));
                return;
            }
        }
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result));
}

fn format_minimal(value: &Value) -> String {
    let (inner, degraded) = unwrap_estimate(value);
    let text = match inner {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(inner).unwrap_or_default(),
    };
    if degraded {
        format!("{} (degraded)", text)
    } else {
        text
    }
}
