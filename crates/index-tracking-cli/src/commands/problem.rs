use clap::Args;
use serde_json::Value;
use std::time::Instant;

use index_tracking_core::problem::{
    sector::{self, SectorInput},
    validator::{self, ProblemInput},
    SolveOutcome,
};
use index_tracking_core::{with_metadata, IndexTrackingError};

use crate::input;

/// Arguments for sector band construction
#[derive(Args)]
pub struct SectorArgs {
    /// Path to a JSON/YAML file with asset_names, sector_weights,
    /// sector_distribution and tolerance
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for instance validation
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to a JSON/YAML index-tracking instance
    #[arg(long)]
    pub input: Option<String>,
}

fn read_input<T: serde::de::DeserializeOwned>(
    path: &Option<String>,
    what: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(ref path) = path {
        input::file::read_config(path)
    } else if let Some(data) = input::stdin::read_stdin()? {
        Ok(serde_json::from_value(data)?)
    } else {
        Err(format!("--input file is required for {} (or pipe JSON/YAML via stdin)", what).into())
    }
}

pub fn run_sector_constraints(args: SectorArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let sector_input: SectorInput = read_input(&args.input, "sector constraints")?;
    let result = sector::compute_sector_constraints(&sector_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_validate(args: ValidateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let document: Value = read_input(&args.input, "validation")?;
    validate_document(document)
}

/// A rejected instance, including one whose fields do not decode, is
/// reported as the failed outcome a solve call would return, not as a
/// command error.
fn validate_document(document: Value) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let problem_input: ProblemInput = match serde_json::from_value(document) {
        Ok(input) => input,
        Err(e) => {
            let err = IndexTrackingError::InvalidInput {
                field: "input".into(),
                reason: e.to_string(),
            };
            return Ok(serde_json::to_value(SolveOutcome::rejected(&err))?);
        }
    };

    let instance = match validator::validate_problem(&problem_input) {
        Ok(instance) => instance,
        Err(e) => return Ok(serde_json::to_value(SolveOutcome::rejected(&e))?),
    };

    let mut warnings = Vec::new();
    if !instance.partition().dropped.is_empty() {
        let dropped: Vec<&str> = instance
            .partition()
            .dropped
            .iter()
            .map(|&i| instance.asset_names()[i].as_str())
            .collect();
        warnings.push(format!(
            "{} asset(s) excluded by the -1 diagonal sentinel: {}",
            dropped.len(),
            dropped.join(", ")
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    let output = with_metadata(
        "Index-tracking MIQP instance validation",
        &serde_json::json!({
            "num_assets": instance.num_assets(),
            "num_kept": instance.num_kept(),
            "portfolio_size": instance.portfolio_size(),
            "rotation_limits": instance.rotation_limits(),
        }),
        warnings,
        elapsed,
        instance.to_payload(),
    );
    Ok(serde_json::to_value(output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(seed: i64) -> Value {
        json!({
            "assets_utility_matrix": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            "assets_to_benchmark_utility_vector": [0.1, 0.2, 0.3],
            "portfolio_size": 2,
            "asset_names": ["A", "B", "C"],
            "random_number_generator_seed": seed
        })
    }

    #[test]
    fn test_valid_document_prints_payload() {
        let out = validate_document(document(7)).unwrap();
        assert_eq!(out["result"]["random_number_generator_seed"], 7);
        assert_eq!(out["result"]["portfolio_size"], 2);
    }

    #[test]
    fn test_negative_seed_prints_failed_outcome() {
        let out = validate_document(document(-1)).unwrap();
        assert_eq!(out["status"], "Failed");
        assert_eq!(out["portfolio"]["No assets"], -1.0);
        let desc = out["error_description"].as_str().unwrap();
        assert!(desc.starts_with("Validation: "));
        assert!(desc.contains("random_number_generator_seed"));
    }

    #[test]
    fn test_undecodable_document_prints_failed_outcome() {
        let mut doc = document(7);
        doc["portfolio_size"] = json!("three");
        let out = validate_document(doc).unwrap();
        assert_eq!(out["status"], "Failed");
        assert!(out["error_description"]
            .as_str()
            .unwrap()
            .starts_with("Validation: Invalid input"));
    }
}
