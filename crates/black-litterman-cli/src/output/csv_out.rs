use serde_json::Value;
use std::io;

use super::{format_scalar, object_rows, result_of};

/// Write the primary records of the result as CSV to stdout.
///
/// List results are written one record per row; an allocation writes its
/// per-asset rows; anything else becomes two-column `field,value` output.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let result = result_of(value);
    let records = match result {
        Value::Array(arr) => Some(arr.as_slice()),
        Value::Object(map) => map.get("assets").and_then(Value::as_array).map(Vec::as_slice),
        _ => None,
    };

    if let Some((headers, rows)) = records.and_then(object_rows) {
        let _ = wtr.write_record(&headers);
        for row in rows {
            let _ = wtr.write_record(&row);
        }
    } else if let Value::Object(map) = result {
        let _ = wtr.write_record(["field", "value"]);
        for (key, val) in map {
            let _ = wtr.write_record([key.as_str(), &format_scalar(val)]);
        }
    } else {
        let _ = wtr.write_record([&format_scalar(result)]);
    }

    let _ = wtr.flush();
}
