use serde_json::Value;

use super::{format_scalar, result_of};

/// Print just the key answer: one `name value` line per asset for
/// allocations and implied returns, the volatilities for a covariance.
pub fn print_minimal(value: &Value) {
    let result = result_of(value);

    let (rows, field) = match result {
        Value::Object(map) => match map.get("assets") {
            Some(Value::Array(assets)) => (assets.as_slice(), "blended_weight"),
            _ => {
                print_first_field(result);
                return;
            }
        },
        Value::Array(arr) => (arr.as_slice(), "implied_return"),
        other => {
            println!("{}", format_scalar(other));
            return;
        }
    };

    for row in rows {
        let name = row.get("name").map(format_scalar).unwrap_or_default();
        let val = row.get(field).map(format_scalar).unwrap_or_default();
        println!("{} {}", name, val);
    }
}

fn print_first_field(result: &Value) {
    let priority_keys = ["volatilities", "covariance"];
    if let Value::Object(map) = result {
        for key in &priority_keys {
            if let Some(val) = map.get(*key).filter(|v| !v.is_null()) {
                println!("{}", format_scalar(val));
                return;
            }
        }
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_scalar(val));
        }
    }
}
