use chrono::NaiveDate;
use index_tracking_core::{PriceRow, PriceTable};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Read a JSON or YAML file (by extension) and deserialise into a typed struct.
pub fn read_config<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    let is_yaml = matches!(
        canonical.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let value: T = if is_yaml {
        serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?
    } else {
        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?
    };
    Ok(value)
}

/// Read a price CSV: header row `date,<id>,<id>,...`, one row per ISO date,
/// an empty cell for a missing price.
pub fn read_price_csv(path: &str) -> Result<PriceTable, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;

    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
        return Err(format!(
            "'{}' needs a date column followed by at least one price column",
            canonical.display()
        )
        .into());
    }
    let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        // Header is line 1.
        let line = line + 2;
        let date_cell = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(date_cell, "%Y-%m-%d")
            .map_err(|e| format!("line {}: invalid date '{}': {}", line, date_cell, e))?;
        let prices = record
            .iter()
            .skip(1)
            .zip(columns.iter())
            .map(|(cell, column)| parse_price(cell, column, line))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(PriceRow { date, prices });
    }

    Ok(PriceTable::new(columns, rows)?)
}

fn parse_price(cell: &str, column: &str, line: usize) -> Result<Option<f64>, String> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|e| format!("line {}: invalid price '{}' for {}: {}", line, cell, column, e))
}

/// Resolve and validate the path, preventing directory traversal.
fn resolve_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }

    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }

    Ok(canonical)
}
