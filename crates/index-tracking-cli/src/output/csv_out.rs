use serde_json::{Map, Value};
use std::io;

/// Write output as CSV to stdout.
pub fn print_csv(value: &Value) {
    let mut wtr = csv::Writer::from_writer(io::stdout().lock());
    write_csv(&mut wtr, value);
    if let Err(e) = wtr.flush() {
        tracing::error!("failed to write CSV output: {}", e);
    }
}

/// A result carrying a matrix is written as that matrix labelled by asset,
/// followed by a `benchmark` row when the result has a benchmark vector.
/// Anything else becomes `field,value` rows, with nested mappings flattened
/// to `parent.key`.
fn write_csv<W: io::Write>(wtr: &mut csv::Writer<W>, value: &Value) {
    let body = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match body {
        Value::Object(map) => match labelled_matrix(map) {
            Some(matrix) => write_matrix(wtr, &matrix),
            None => {
                let _ = wtr.write_record(["field", "value"]);
                write_fields(wtr, "", map);
            }
        },
        other => {
            let _ = wtr.write_record([format_csv_value(other)]);
        }
    }
}

/// Matrix field of a result, with the benchmark vector that pairs with it.
struct LabelledMatrix<'a> {
    labels: Vec<String>,
    rows: &'a [Value],
    benchmark: Option<&'a [Value]>,
}

/// Column and row labels are asset names when the result carries them and
/// the width matches, otherwise `c0, c1, ...` and `r0, r1, ...`.
fn labelled_matrix(map: &Map<String, Value>) -> Option<LabelledMatrix<'_>> {
    let (rows, benchmark) = [
        ("utility_matrix", "utility_vector"),
        ("assets_utility_matrix", "assets_to_benchmark_utility_vector"),
        ("matrix", ""),
    ]
    .iter()
    .find_map(|(m, v)| {
        let rows = map.get(*m).and_then(Value::as_array)?;
        Some((rows, map.get(*v).and_then(Value::as_array)))
    })?;
    let width = rows.first().and_then(Value::as_array).map(Vec::len)?;
    let labels = match map.get("asset_names").and_then(Value::as_array) {
        Some(names) if names.len() == width => names.iter().map(format_csv_value).collect(),
        _ => (0..width).map(|i| format!("c{}", i)).collect(),
    };
    Some(LabelledMatrix {
        labels,
        rows: rows.as_slice(),
        benchmark: benchmark.map(Vec::as_slice).filter(|b| b.len() == width),
    })
}

/// Header `asset,<labels>`, one row per matrix row, then a `benchmark` row
/// holding the benchmark vector when the result has one.
fn write_matrix<W: io::Write>(wtr: &mut csv::Writer<W>, matrix: &LabelledMatrix<'_>) {
    let square = matrix.rows.len() == matrix.labels.len();
    let header = std::iter::once("asset").chain(matrix.labels.iter().map(String::as_str));
    let _ = wtr.write_record(header);
    for (i, cells) in matrix.rows.iter().filter_map(Value::as_array).enumerate() {
        let label = if square {
            matrix.labels[i].clone()
        } else {
            format!("r{}", i)
        };
        let _ = wtr.write_record(std::iter::once(label).chain(cells.iter().map(format_csv_value)));
    }
    if let Some(vector) = matrix.benchmark {
        let _ = wtr.write_record(
            std::iter::once("benchmark".to_string()).chain(vector.iter().map(format_csv_value)),
        );
    }
}

fn write_fields<W: io::Write>(wtr: &mut csv::Writer<W>, prefix: &str, map: &Map<String, Value>) {
    for (key, val) in map {
        let field = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match val {
            Value::Object(inner) => write_fields(wtr, &field, inner),
            _ => {
                let _ = wtr.write_record([field, format_csv_value(val)]);
            }
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        // NaN serialises as null
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(format_csv_value).collect::<Vec<_>>().join(";"),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(value: &Value) -> String {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        write_csv(&mut wtr, value);
        String::from_utf8(wtr.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_utility_result_keeps_benchmark_vector() {
        let out = render(&json!({
            "result": {
                "utility_matrix": [[2.0, 0.5], [0.5, 1.0]],
                "utility_vector": [0.25, 0.75],
                "asset_names": ["AAA", "BBB"],
                "observations": 10
            },
            "warnings": []
        }));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec!["asset,AAA,BBB", "AAA,2.0,0.5", "BBB,0.5,1.0", "benchmark,0.25,0.75"]
        );
    }

    #[test]
    fn test_constraint_block_has_no_benchmark_row() {
        let out = render(&json!({"result": {"matrix": [[1.0, 0.0, 1.0], [-1.0, 0.0, -1.0]]}}));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec!["asset,c0,c1,c2", "r0,1.0,0.0,1.0", "r1,-1.0,0.0,-1.0"]);
    }

    #[test]
    fn test_outcome_flattens_portfolio() {
        let out = render(&json!({"portfolio": {"No assets": -1.0}, "status": "Failed"}));
        assert!(out.contains("portfolio.No assets,-1.0"));
        assert!(out.contains("status,Failed"));
    }
}
