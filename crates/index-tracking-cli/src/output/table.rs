use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Render an envelope or a bare outcome as tables: scalar fields first, then
/// one table per matrix, asset vector or mapping, then warnings.
pub fn print_table(value: &Value) {
    let Some(map) = value.as_object() else {
        println!("{}", format_value(value));
        return;
    };

    match map.get("result") {
        Some(Value::Object(result)) => {
            print_sections(result);
            print_footer(map);
        }
        _ => print_sections(map),
    }
}

fn print_sections(map: &Map<String, Value>) {
    let names: Option<Vec<String>> = map
        .get("asset_names")
        .and_then(Value::as_array)
        .map(|a| a.iter().map(format_value).collect());

    let mut scalars = Builder::default();
    scalars.push_record(["Field", "Value"]);
    let mut sections: Vec<(&str, Table)> = Vec::new();

    for (key, val) in map {
        if key == "asset_names" {
            continue;
        }
        match val {
            Value::Array(rows) if !rows.is_empty() && rows.iter().all(Value::is_array) => {
                sections.push((key.as_str(), matrix_table(rows, names.as_deref())));
            }
            Value::Array(cells) if names.as_ref().is_some_and(|n| n.len() == cells.len()) => {
                let labels = names.as_deref().unwrap_or_default();
                sections.push((key.as_str(), keyed_table("Asset", labels.iter().zip(cells))));
            }
            Value::Object(entries) if entries.values().all(|v| !v.is_object()) => {
                sections.push((key.as_str(), keyed_table("Key", entries.iter())));
            }
            _ => scalars.push_record([key.as_str(), &format_value(val)]),
        }
    }

    println!("{}", Table::from(scalars));
    for (key, table) in sections {
        println!("\n{}:\n{}", key, table);
    }
}

/// Rows labelled `r<i>` or by asset when the matrix is square over the
/// asset list; columns labelled by asset when the width matches.
fn matrix_table(rows: &[Value], names: Option<&[String]>) -> Table {
    let width = rows.first().and_then(Value::as_array).map_or(0, Vec::len);
    let cols = names.filter(|n| n.len() == width);
    let row_labels = names.filter(|n| n.len() == rows.len() && cols.is_some());

    let mut builder = Builder::default();
    let mut header = vec![String::new()];
    match cols {
        Some(n) => header.extend(n.iter().cloned()),
        None => header.extend((0..width).map(|j| format!("c{}", j))),
    }
    builder.push_record(header);

    for (i, row) in rows.iter().enumerate() {
        let label = row_labels.map_or_else(|| format!("r{}", i), |n| n[i].clone());
        let mut record = vec![label];
        if let Value::Array(cells) = row {
            record.extend(cells.iter().map(format_value));
        }
        builder.push_record(record);
    }
    Table::from(builder)
}

fn keyed_table<'a, K, I>(label: &str, entries: I) -> Table
where
    K: AsRef<str> + 'a,
    I: Iterator<Item = (&'a K, &'a Value)>,
{
    let mut builder = Builder::default();
    builder.push_record([label, "Value"]);
    for (k, v) in entries {
        builder.push_record([k.as_ref(), &format_value(v)]);
    }
    Table::from(builder)
}

fn print_footer(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }
    if let Some(meth) = envelope.get("methodology").and_then(Value::as_str) {
        println!("\nMethodology: {}", meth);
    }
    if let Some(us) = envelope.get("metadata").and_then(|m| m.get("computation_time_us")) {
        println!("Computed in {} us", format_value(us));
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => arr.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
