use serde_json::Value;

/// One-line summary of a command result.
///
/// - solve outcome: `<status>` or `<status>: <error_description>`
/// - utility estimate: kept / total assets and observation count
/// - solver document: asset count and portfolio size
/// - constraint block: `<rows>x<cols>`
pub fn print_minimal(value: &Value) {
    let body = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);
    println!("{}", summarise(body));
}

fn summarise(body: &Value) -> String {
    let field = |k: &str| body.get(k).filter(|v| !v.is_null());
    let len = |k: &str| field(k).and_then(Value::as_array).map_or(0, Vec::len);

    if let Some(status) = field("status").and_then(Value::as_str) {
        return match field("error_description").and_then(Value::as_str) {
            Some(desc) => format!("{}: {}", status, desc),
            None => status.to_string(),
        };
    }
    if let Some(obs) = field("observations") {
        let kept = body.pointer("/partition/kept").and_then(Value::as_array).map_or(0, Vec::len);
        return format!("{}/{} assets kept, {} observations", kept, len("asset_names"), obs);
    }
    if let Some(k) = field("portfolio_size") {
        return format!("{} assets, portfolio_size {}", len("asset_names"), k);
    }
    if let Some(rows) = field("matrix").and_then(Value::as_array) {
        let cols = rows.first().and_then(Value::as_array).map_or(0, Vec::len);
        return format!("{}x{}", rows.len(), cols);
    }
    serde_json::to_string(body).unwrap_or_default()
}
