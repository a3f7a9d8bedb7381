use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::validator::ProblemInstance;
use crate::error::IndexTrackingError;
use crate::types::AssetName;
use crate::IndexTrackingResult;

/// Portfolio key returned when no solve took place.
pub const PLACEHOLDER_ASSET: &str = "No assets";

/// Weight tolerance used when checking a returned candidate.
pub const CANDIDATE_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Terminal solver status. Anything besides `Ok` / `Failed` is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SolveStatus {
    Ok,
    Failed,
    Other(String),
}

impl SolveStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SolveStatus::Ok => "Ok",
            SolveStatus::Failed => "Failed",
            SolveStatus::Other(s) => s,
        }
    }
}

impl From<String> for SolveStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Ok" => SolveStatus::Ok,
            "Failed" => SolveStatus::Failed,
            _ => SolveStatus::Other(s),
        }
    }
}

impl From<SolveStatus> for String {
    fn from(s: SolveStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Portfolio, status and optional error description of one solve request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveOutcome {
    pub portfolio: BTreeMap<AssetName, f64>,
    pub status: SolveStatus,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Deserialize)]
struct SolverResponse {
    named_solution: BTreeMap<AssetName, f64>,
    status: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl SolveOutcome {
    /// Failure outcome for a request that never reached the solver.
    pub fn placeholder(description: impl Into<String>) -> Self {
        SolveOutcome {
            portfolio: BTreeMap::from([(PLACEHOLDER_ASSET.to_string(), -1.0)]),
            status: SolveStatus::Failed,
            error_description: Some(description.into()),
        }
    }

    /// Placeholder for an instance rejected locally, described as
    /// `"<class>: <error>"`.
    pub fn rejected(error: &IndexTrackingError) -> Self {
        Self::placeholder(format!("{}: {}", error.kind().label(), error))
    }

    /// Decode a solver response document (`named_solution`, `status`,
    /// optional `error_description`).
    pub fn from_response(response: serde_json::Value) -> IndexTrackingResult<Self> {
        let raw: SolverResponse = serde_json::from_value(response)
            .map_err(|e| IndexTrackingError::Gateway(format!("malformed solver response: {}", e)))?;
        Ok(SolveOutcome {
            portfolio: raw.named_solution,
            status: raw.status.into(),
            error_description: raw.error_description,
        })
    }

    pub fn is_ok(&self) -> bool {
        self.status == SolveStatus::Ok
    }

    pub fn is_placeholder(&self) -> bool {
        self.portfolio.len() == 1 && self.portfolio.get(PLACEHOLDER_ASSET) == Some(&-1.0)
    }
}

// ---------------------------------------------------------------------------
// Candidate checks
// ---------------------------------------------------------------------------

/// Check a returned portfolio against the instance: only kept assets,
/// exactly `portfolio_size` non-zero weights, each within the weight bounds,
/// and the total equal to `sum_of_portfolio_weights`. Never alters the outcome.
pub fn check_candidate(
    instance: &ProblemInstance,
    candidate: &BTreeMap<AssetName, f64>,
) -> IndexTrackingResult<()> {
    let kept: HashSet<&str> = instance.kept_asset_names().into_iter().collect();
    let mut held = 0usize;
    let mut total = 0.0;

    for (name, &w) in candidate {
        let field = format!("portfolio[{}]", name);
        if !w.is_finite() || w < 0.0 {
            return Err(IndexTrackingError::Range {
                field,
                value: w.to_string(),
                reason: "weights must be finite and non-negative".into(),
            });
        }
        if w == 0.0 {
            continue;
        }
        if !kept.contains(name.as_str()) {
            return Err(IndexTrackingError::Feasibility {
                field,
                reason: "asset is not part of the kept universe".into(),
            });
        }
        if w < instance.minimum_weight() - CANDIDATE_TOLERANCE
            || w > instance.maximum_weight() + CANDIDATE_TOLERANCE
        {
            return Err(IndexTrackingError::Feasibility {
                field,
                reason: format!(
                    "weight {} outside [{}, {}]",
                    w,
                    instance.minimum_weight(),
                    instance.maximum_weight()
                ),
            });
        }
        held += 1;
        total += w;
    }

    if held != instance.portfolio_size() as usize {
        return Err(IndexTrackingError::Feasibility {
            field: "portfolio".into(),
            reason: format!(
                "{} non-zero weights, portfolio_size is {}",
                held,
                instance.portfolio_size()
            ),
        });
    }
    if (total - instance.sum_of_portfolio_weights()).abs() > CANDIDATE_TOLERANCE {
        return Err(IndexTrackingError::Feasibility {
            field: "portfolio".into(),
            reason: format!(
                "weights sum to {}, expected {}",
                total,
                instance.sum_of_portfolio_weights()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::validator::{validate_problem, ProblemInput};

    fn instance() -> ProblemInstance {
        let n = 4;
        let m = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        let names = vec!["A".into(), "B".into(), "C".into(), "D".into()];
        validate_problem(
            &ProblemInput::new(m, vec![0.1; n], 2, names).with_weight_bounds(0.1, 0.8),
        )
        .unwrap()
    }

    fn portfolio(entries: &[(&str, f64)]) -> BTreeMap<AssetName, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_placeholder() {
        let p = SolveOutcome::placeholder("Validation: bad");
        assert_eq!(p.status, SolveStatus::Failed);
        assert_eq!(p.portfolio.get("No assets"), Some(&-1.0));
        assert!(p.is_placeholder());
        assert!(!p.is_ok());
    }

    #[test]
    fn test_rejected_prefixes_error_class() {
        let err = IndexTrackingError::IncompleteSpecification {
            field: "sectorial_distribution".into(),
            reason: "weights missing".into(),
        };
        let out = SolveOutcome::rejected(&err);
        assert!(out.is_placeholder());
        assert!(out
            .error_description
            .unwrap()
            .starts_with("Validation: Incomplete specification"));
    }

    #[test]
    fn test_from_response() {
        let out = SolveOutcome::from_response(serde_json::json!({
            "named_solution": {"A": 0.4, "C": 0.6},
            "status": "Ok"
        }))
        .unwrap();
        assert!(out.is_ok());
        assert_eq!(out.error_description, None);
        assert_eq!(out.portfolio.len(), 2);
    }

    #[test]
    fn test_from_response_keeps_unknown_status_and_error() {
        let out = SolveOutcome::from_response(serde_json::json!({
            "named_solution": {},
            "status": "Timeout",
            "error_description": "took too long"
        }))
        .unwrap();
        assert_eq!(out.status, SolveStatus::Other("Timeout".into()));
        assert_eq!(out.error_description.as_deref(), Some("took too long"));
    }

    #[test]
    fn test_from_response_without_solution_is_gateway_error() {
        let err = SolveOutcome::from_response(serde_json::json!({"status": "Ok"})).unwrap_err();
        assert!(matches!(err, IndexTrackingError::Gateway(_)));
    }

    #[test]
    fn test_status_serialises_as_plain_string() {
        let json = serde_json::to_value(SolveOutcome::placeholder("x")).unwrap();
        assert_eq!(json["status"], "Failed");
    }

    #[test]
    fn test_feasible_candidate() {
        let inst = instance();
        assert!(check_candidate(&inst, &portfolio(&[("A", 0.3), ("D", 0.7), ("B", 0.0)])).is_ok());
    }

    #[test]
    fn test_candidate_wrong_cardinality() {
        let inst = instance();
        let err = check_candidate(&inst, &portfolio(&[("A", 0.2), ("B", 0.3), ("C", 0.5)]))
            .unwrap_err();
        assert_eq!(err.field(), Some("portfolio"));
    }

    #[test]
    fn test_candidate_weight_out_of_bounds() {
        let inst = instance();
        assert!(check_candidate(&inst, &portfolio(&[("A", 0.05), ("B", 0.95)])).is_err());
    }

    #[test]
    fn test_candidate_sum_mismatch() {
        let inst = instance();
        assert!(check_candidate(&inst, &portfolio(&[("A", 0.3), ("B", 0.3)])).is_err());
    }

    #[test]
    fn test_candidate_unknown_asset() {
        let inst = instance();
        let err = check_candidate(&inst, &portfolio(&[("A", 0.5), ("Z", 0.5)])).unwrap_err();
        assert_eq!(err.field(), Some("portfolio[Z]"));
    }
}
