use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{format_scalar, object_rows, result_of};

/// Render the result as tables: scalar fields first, then one table per
/// list of records and per matrix.
pub fn print_table(value: &Value) {
    match result_of(value) {
        Value::Object(result) => print_result(result),
        Value::Array(arr) => print_records(arr),
        other => println!("{}", format_scalar(other)),
    }

    if let Some(Value::Array(warnings)) = value.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }
    if let Some(Value::String(meth)) = value.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_result(result: &Map<String, Value>) {
    let mut fields = Builder::default();
    fields.push_record(["Field", "Value"]);
    let mut sections: Vec<(&str, &Vec<Value>)> = Vec::new();

    for (key, val) in result {
        match val {
            Value::Array(arr)
                if arr.iter().all(|v| v.is_object() || v.is_array()) && !arr.is_empty() =>
            {
                sections.push((key.as_str(), arr));
            }
            Value::Object(nested) => {
                for (sub, v) in nested {
                    fields.push_record([format!("{}.{}", key, sub), format_scalar(v)]);
                }
            }
            Value::Array(arr) => {
                let items: Vec<String> = arr.iter().map(format_scalar).collect();
                fields.push_record([key.clone(), items.join(", ")]);
            }
            _ => fields.push_record([key.clone(), format_scalar(val)]),
        }
    }
    println!("{}", Table::from(fields));

    for (title, arr) in sections {
        println!("\n{}:", title);
        if arr.iter().all(Value::is_array) {
            print_matrix(arr);
        } else {
            print_records(arr);
        }
    }
}

fn print_records(arr: &[Value]) {
    match object_rows(arr) {
        Some((headers, rows)) => {
            let mut builder = Builder::default();
            builder.push_record(headers);
            for row in rows {
                builder.push_record(row);
            }
            println!("{}", Table::from(builder));
        }
        None if arr.is_empty() => println!("(empty)"),
        None => {
            for item in arr {
                println!("{}", format_scalar(item));
            }
        }
    }
}

fn print_matrix(rows: &[Value]) {
    let width = rows.first().and_then(Value::as_array).map_or(0, Vec::len);
    let mut builder = Builder::default();
    let mut header = vec![String::new()];
    header.extend((0..width).map(|j| j.to_string()));
    builder.push_record(header);
    for (i, row) in rows.iter().enumerate() {
        let mut record = vec![i.to_string()];
        if let Value::Array(cells) = row {
            record.extend(cells.iter().map(format_scalar));
        }
        builder.push_record(record);
    }
    println!("{}", Table::from(builder));
}
