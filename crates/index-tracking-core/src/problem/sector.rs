use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::IndexTrackingError;
use crate::types::{with_metadata, AssetName, ComputationOutput, ConstraintBlock};
use crate::validate;
use crate::IndexTrackingResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Sector band request over an asset universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorInput {
    pub asset_names: Vec<AssetName>,
    /// Index weight of each sector.
    pub sector_weights: BTreeMap<String, f64>,
    /// Sector of each asset.
    pub sector_distribution: BTreeMap<AssetName, String>,
    /// Relative band half-width, e.g. `0.05` for +/-5% of the target.
    pub tolerance: f64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Sector bands as a lower-bound-only constraint block of shape `(2S, N)`.
///
/// Rows `0..S` are the 0/1 membership rows with lower bound
/// `target * (1 - tol)`; rows `S..2S` are their negation with lower bound
/// `-target * (1 + tol)`. Sectors are ordered by name.
pub fn build_sector_constraints(
    asset_names: &[AssetName],
    sector_weights: &BTreeMap<String, f64>,
    sector_distribution: &BTreeMap<AssetName, String>,
    tolerance: f64,
) -> IndexTrackingResult<ConstraintBlock> {
    validate::real(tolerance, Some(0.0), None, "sectorial_weight_tolerance")?;
    validate::mapping_values(sector_weights, "sectorial_weights", Some(0.0), Some(1.0))?;

    let sectors: Vec<&String> = sector_weights.keys().collect();
    let num_sectors = sectors.len();
    let num_assets = asset_names.len();

    let mut membership = vec![vec![0.0; num_assets]; num_sectors];
    for (i, ticker) in asset_names.iter().enumerate() {
        let sector = sector_distribution
            .get(ticker)
            .ok_or_else(|| IndexTrackingError::Feasibility {
                field: "sectorial_distribution".into(),
                reason: format!(
                    "the ticker {} is in the asset universe but has no sector assigned",
                    ticker
                ),
            })?;
        let s = sectors
            .binary_search(&sector)
            .map_err(|_| IndexTrackingError::Feasibility {
                field: "sectorial_weights".into(),
                reason: format!(
                    "sector '{}' of ticker {} has no target weight",
                    sector, ticker
                ),
            })?;
        membership[s][i] = 1.0;
    }

    for (s, row) in membership.iter().enumerate() {
        if row.iter().all(|&v| v == 0.0) {
            warn!(sector = %sectors[s], "sector has no member in the asset universe");
        }
    }

    let mut lower = Vec::with_capacity(2 * num_sectors);
    lower.extend(sectors.iter().map(|s| sector_weights[*s] * (1.0 - tolerance)));
    lower.extend(sectors.iter().map(|s| -sector_weights[*s] * (1.0 + tolerance)));

    let negated: Vec<Vec<f64>> = membership
        .iter()
        .map(|row| row.iter().map(|v| -v).collect())
        .collect();
    let mut matrix = membership;
    matrix.extend(negated);

    debug!(sectors = num_sectors, assets = num_assets, "sector bands built");
    Ok(ConstraintBlock {
        matrix,
        lower_bounds: Some(lower),
        upper_bounds: None,
    })
}

/// [`build_sector_constraints`] wrapped in the standard output envelope.
pub fn compute_sector_constraints(
    input: &SectorInput,
) -> IndexTrackingResult<ComputationOutput<ConstraintBlock>> {
    let start = Instant::now();
    let block = build_sector_constraints(
        &input.asset_names,
        &input.sector_weights,
        &input.sector_distribution,
        input.tolerance,
    )?;

    let mut warnings = Vec::new();
    let total: f64 = input.sector_weights.values().sum();
    if (total - 1.0).abs() > 1e-6 {
        warnings.push(format!("Sector weights sum to {:.6}, not 1", total));
    }
    let universe: HashSet<&str> =
        input.asset_names.iter().map(String::as_str).collect();
    let extra = input
        .sector_distribution
        .keys()
        .filter(|k| !universe.contains(k.as_str()))
        .count();
    if extra > 0 {
        warnings.push(format!(
            "{} ticker(s) in the sector distribution are not in the asset universe and were ignored",
            extra
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sector weight bands as two one-sided linear inequalities per sector",
        &serde_json::json!({
            "num_sectors": input.sector_weights.len(),
            "num_assets": input.asset_names.len(),
            "tolerance": input.tolerance,
            "form": "matrix . w >= lower_bounds",
        }),
        warnings,
        elapsed,
        block,
    ))
}
