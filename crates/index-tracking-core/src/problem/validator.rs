//! Validation of a raw index-tracking instance into an immutable
//! [`ProblemInstance`] and its serialisation to the solver document.
//!
//! Excluded assets travel on the wire as a `-1` diagonal entry with zeros in
//! the rest of their row and column. Internally the instance keeps the
//! explicit kept/dropped partition and the kept sub-matrix; the sentinel
//! encoding is rebuilt only by [`ProblemInstance::to_payload`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use super::outcome::CANDIDATE_TOLERANCE;
use super::sector::build_sector_constraints;
use crate::error::IndexTrackingError;
use crate::types::{AssetName, AssetPartition, ConstraintBlock, Matrix, EXCLUDED_DIAGONAL};
use crate::validate::{self, MatrixChecks, MAX_ARRAY_DIM};
use crate::IndexTrackingResult;

pub const DEFAULT_SEED: i64 = 123321;

/// Wire value of an inactive rotation limit.
pub const UNSET_ROTATION_LIMIT: i64 = -1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Raw instance fields as received from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemInput {
    pub assets_utility_matrix: Matrix,
    pub assets_to_benchmark_utility_vector: Vec<f64>,
    /// Number of non-zero weights in the tracker portfolio.
    pub portfolio_size: i64,
    pub asset_names: Vec<AssetName>,
    #[serde(default)]
    pub minimum_weight: f64,
    #[serde(default = "default_maximum_weight")]
    pub maximum_weight: f64,
    #[serde(default)]
    pub linear_constraints_matrix: Option<Matrix>,
    #[serde(default)]
    pub lower_bounds_vector: Option<Vec<f64>>,
    #[serde(default)]
    pub upper_bounds_vector: Option<Vec<f64>>,
    #[serde(default)]
    pub previous_portfolio: Option<BTreeMap<AssetName, f64>>,
    /// Negative means unconstrained.
    #[serde(default = "default_companies_rotation")]
    pub max_companies_rotation: i64,
    /// Negative means unconstrained.
    #[serde(default = "default_sales_rotation")]
    pub max_sales_rotation: f64,
    #[serde(default)]
    pub sectorial_weights: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub sectorial_distribution: Option<BTreeMap<AssetName, String>>,
    #[serde(default)]
    pub sectorial_weight_tolerance: Option<f64>,
    #[serde(default = "default_sum_of_weights")]
    pub sum_of_portfolio_weights: f64,
    #[serde(default = "default_seed")]
    pub random_number_generator_seed: i64,
    #[serde(default)]
    pub description: String,
}

fn default_maximum_weight() -> f64 {
    1.0
}
fn default_companies_rotation() -> i64 {
    UNSET_ROTATION_LIMIT
}
fn default_sales_rotation() -> f64 {
    UNSET_ROTATION_LIMIT as f64
}
fn default_sum_of_weights() -> f64 {
    1.0
}
fn default_seed() -> i64 {
    DEFAULT_SEED
}

impl ProblemInput {
    /// Required fields only; everything else at its default.
    pub fn new(
        assets_utility_matrix: Matrix,
        assets_to_benchmark_utility_vector: Vec<f64>,
        portfolio_size: i64,
        asset_names: Vec<AssetName>,
    ) -> Self {
        ProblemInput {
            assets_utility_matrix,
            assets_to_benchmark_utility_vector,
            portfolio_size,
            asset_names,
            minimum_weight: 0.0,
            maximum_weight: default_maximum_weight(),
            linear_constraints_matrix: None,
            lower_bounds_vector: None,
            upper_bounds_vector: None,
            previous_portfolio: None,
            max_companies_rotation: default_companies_rotation(),
            max_sales_rotation: default_sales_rotation(),
            sectorial_weights: None,
            sectorial_distribution: None,
            sectorial_weight_tolerance: None,
            sum_of_portfolio_weights: default_sum_of_weights(),
            random_number_generator_seed: DEFAULT_SEED,
            description: String::new(),
        }
    }

    pub fn with_weight_bounds(mut self, minimum_weight: f64, maximum_weight: f64) -> Self {
        self.minimum_weight = minimum_weight;
        self.maximum_weight = maximum_weight;
        self
    }

    pub fn with_linear_constraints(mut self, block: ConstraintBlock) -> Self {
        self.linear_constraints_matrix = Some(block.matrix);
        self.lower_bounds_vector = block.lower_bounds;
        self.upper_bounds_vector = block.upper_bounds;
        self
    }

    pub fn with_previous_portfolio(
        mut self,
        previous: BTreeMap<AssetName, f64>,
        limits: RotationLimits,
    ) -> Self {
        self.previous_portfolio = Some(previous);
        self.max_companies_rotation = limits
            .max_companies
            .map(i64::from)
            .unwrap_or(UNSET_ROTATION_LIMIT);
        self.max_sales_rotation = limits.max_sales.unwrap_or(UNSET_ROTATION_LIMIT as f64);
        self
    }

    pub fn with_sectors(
        mut self,
        weights: BTreeMap<String, f64>,
        distribution: BTreeMap<AssetName, String>,
        tolerance: f64,
    ) -> Self {
        self.sectorial_weights = Some(weights);
        self.sectorial_distribution = Some(distribution);
        self.sectorial_weight_tolerance = Some(tolerance);
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.random_number_generator_seed = seed;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Rotation caps relative to a previous portfolio. `None` is unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationLimits {
    /// Previously held assets that may be sold out entirely.
    pub max_companies: Option<u32>,
    /// Total weight that may be sold, `sum |w_prev - w| / 2`.
    pub max_sales: Option<f64>,
}

impl RotationLimits {
    fn from_raw(companies: i64, sales: f64) -> IndexTrackingResult<Self> {
        validate::integer(companies, UNSET_ROTATION_LIMIT, u32::MAX as i64, "max_companies_rotation")?;
        validate::real(sales, None, None, "max_sales_rotation")?;
        Ok(RotationLimits {
            max_companies: u32::try_from(companies).ok(),
            max_sales: (sales >= 0.0).then_some(sales),
        })
    }
}

/// Sector band specification together with its assembled constraint block.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorConstraints {
    pub weights: BTreeMap<String, f64>,
    pub distribution: BTreeMap<AssetName, String>,
    pub tolerance: f64,
    pub block: ConstraintBlock,
}

/// A fully validated instance. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemInstance {
    asset_names: Vec<AssetName>,
    partition: AssetPartition,
    kept_utility_matrix: Matrix,
    kept_utility_vector: Vec<f64>,
    portfolio_size: u32,
    minimum_weight: f64,
    maximum_weight: f64,
    sum_of_portfolio_weights: f64,
    linear_constraints: Option<ConstraintBlock>,
    previous_portfolio: Option<BTreeMap<AssetName, f64>>,
    rotation: RotationLimits,
    sectors: Option<SectorConstraints>,
    seed: u32,
    description: String,
}

/// The key-value document the solver consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverPayload {
    pub assets_utility_matrix: Matrix,
    pub assets_to_benchmark_utility_vector: Vec<f64>,
    pub portfolio_size: u32,
    pub asset_names: Vec<AssetName>,
    pub minimum_weight: f64,
    pub maximum_weight: f64,
    pub sum_of_portfolio_weights: f64,
    pub random_number_generator_seed: u32,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear_constraints_matrix: Option<Matrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bounds_vector: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bounds_vector: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_portfolio: Option<BTreeMap<AssetName, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_companies_rotation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sales_rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sectorial_distribution: Option<BTreeMap<AssetName, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sectorial_weights: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sectorial_weight_tolerance: Option<f64>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Validate every field and build an immutable instance.
///
/// Checks run in a fixed order: the full matrix (square, symmetric, size
/// cap), vector and name lengths, the kept sub-matrix (symmetric PSD),
/// linear constraints, cardinality feasibility, then scalars and the
/// optional rotation and sector groups.
pub fn validate_problem(input: &ProblemInput) -> IndexTrackingResult<ProblemInstance> {
    let matrix = &input.assets_utility_matrix;
    let (n, _) = validate::matrix(matrix, "assets_utility_matrix", MatrixChecks::square_symmetric())?;
    let dims = Some((n, "the dimensions of the assets utility matrix"));

    validate::vector(
        &input.assets_to_benchmark_utility_vector,
        "assets_to_benchmark_utility_vector",
        dims,
        MAX_ARRAY_DIM,
    )?;
    validate_asset_names(&input.asset_names, n)?;

    let partition = AssetPartition::from_sentinel_diagonal(matrix);
    validate_sentinels(matrix, &input.assets_to_benchmark_utility_vector, &partition)?;
    let kept_utility_matrix = partition.extract(matrix);
    validate::matrix(
        &kept_utility_matrix,
        "assets_utility_matrix_without_missing_data",
        MatrixChecks::symmetric_psd(),
    )?;
    let kept_utility_vector: Vec<f64> = partition
        .kept
        .iter()
        .map(|&i| input.assets_to_benchmark_utility_vector[i])
        .collect();
    debug!(
        assets = n,
        kept = partition.num_kept(),
        dropped = partition.dropped.len(),
        "utility matrix accepted"
    );

    let linear_constraints = validate_linear_constraints(input, n)?;

    let num_kept = partition.num_kept() as i64;
    if input.portfolio_size <= 0 || input.portfolio_size >= num_kept {
        return Err(IndexTrackingError::Feasibility {
            field: "portfolio_size".into(),
            reason: format!(
                "portfolio_size={} is not valid. It must be in the range: 0 < portfolio_size < {}, \
                 with {} the number of assets in the utility matrix without missing data",
                input.portfolio_size, num_kept, num_kept
            ),
        });
    }
    let portfolio_size = input.portfolio_size as u32;

    let minimum_weight = validate::real(input.minimum_weight, Some(0.0), Some(1.0), "minimum_weight")?;
    let maximum_weight = validate::real(
        input.maximum_weight,
        Some(minimum_weight),
        Some(1.0),
        "maximum_weight",
    )?;
    let sum_of_portfolio_weights =
        validate::real(input.sum_of_portfolio_weights, Some(0.0), None, "sum_of_portfolio_weights")?;
    if sum_of_portfolio_weights == 0.0 {
        return Err(IndexTrackingError::Range {
            field: "sum_of_portfolio_weights".into(),
            value: "0".into(),
            reason: "must be strictly positive".into(),
        });
    }
    let k = portfolio_size as f64;
    if k * minimum_weight > sum_of_portfolio_weights + CANDIDATE_TOLERANCE
        || k * maximum_weight < sum_of_portfolio_weights - CANDIDATE_TOLERANCE
    {
        return Err(IndexTrackingError::Feasibility {
            field: "sum_of_portfolio_weights".into(),
            reason: format!(
                "{} weights in [{}, {}] cannot add up to {}",
                portfolio_size, minimum_weight, maximum_weight, sum_of_portfolio_weights
            ),
        });
    }
    let seed = validate::seed(input.random_number_generator_seed)?;

    let (previous_portfolio, rotation) = match &input.previous_portfolio {
        Some(prev) => {
            validate::mapping_values(prev, "previous_portfolio", Some(0.0), None)?;
            let known: HashSet<&str> = input.asset_names.iter().map(String::as_str).collect();
            let unknown = prev.keys().filter(|k| !known.contains(k.as_str())).count();
            if unknown > 0 {
                warn!(unknown, "previous portfolio holds assets outside the universe");
            }
            let limits = RotationLimits::from_raw(input.max_companies_rotation, input.max_sales_rotation)?;
            (Some(prev.clone()), limits)
        }
        None => {
            if input.max_companies_rotation >= 0 || input.max_sales_rotation >= 0.0 {
                warn!("rotation limits given without a previous portfolio are ignored");
            }
            (None, RotationLimits::default())
        }
    };

    let sectors = validate_sectors(input)?;

    let instance = ProblemInstance {
        asset_names: input.asset_names.clone(),
        partition,
        kept_utility_matrix,
        kept_utility_vector,
        portfolio_size,
        minimum_weight,
        maximum_weight,
        sum_of_portfolio_weights,
        linear_constraints,
        previous_portfolio,
        rotation,
        sectors,
        seed,
        description: input.description.clone(),
    };
    info!(
        assets = n,
        kept = instance.num_kept(),
        portfolio_size,
        description = %instance.description,
        "index-tracking instance validated"
    );
    Ok(instance)
}

impl ProblemInstance {
    pub fn asset_names(&self) -> &[AssetName] {
        &self.asset_names
    }

    pub fn partition(&self) -> &AssetPartition {
        &self.partition
    }

    pub fn num_assets(&self) -> usize {
        self.asset_names.len()
    }

    pub fn num_kept(&self) -> usize {
        self.partition.num_kept()
    }

    pub fn kept_asset_names(&self) -> Vec<&str> {
        self.partition
            .kept
            .iter()
            .map(|&i| self.asset_names[i].as_str())
            .collect()
    }

    /// Utility matrix restricted to kept assets.
    pub fn kept_utility_matrix(&self) -> &Matrix {
        &self.kept_utility_matrix
    }

    pub fn kept_utility_vector(&self) -> &[f64] {
        &self.kept_utility_vector
    }

    pub fn portfolio_size(&self) -> u32 {
        self.portfolio_size
    }

    pub fn minimum_weight(&self) -> f64 {
        self.minimum_weight
    }

    pub fn maximum_weight(&self) -> f64 {
        self.maximum_weight
    }

    pub fn sum_of_portfolio_weights(&self) -> f64 {
        self.sum_of_portfolio_weights
    }

    pub fn linear_constraints(&self) -> Option<&ConstraintBlock> {
        self.linear_constraints.as_ref()
    }

    pub fn previous_portfolio(&self) -> Option<&BTreeMap<AssetName, f64>> {
        self.previous_portfolio.as_ref()
    }

    pub fn rotation_limits(&self) -> RotationLimits {
        self.rotation
    }

    pub fn sector_constraints(&self) -> Option<&SectorConstraints> {
        self.sectors.as_ref()
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Every linear inequality of the instance, user constraints and sector
    /// bands, in one block over the full asset universe.
    pub fn combined_constraints(&self) -> IndexTrackingResult<Option<ConstraintBlock>> {
        let blocks: Vec<ConstraintBlock> = self
            .linear_constraints
            .iter()
            .cloned()
            .chain(self.sectors.iter().map(|s| s.block.clone()))
            .collect();
        if blocks.is_empty() {
            return Ok(None);
        }
        ConstraintBlock::stack(blocks).map(Some)
    }

    /// Serialisable solver document with the sentinel encoding restored.
    pub fn to_payload(&self) -> SolverPayload {
        let (lin_matrix, lin_lower, lin_upper) = match &self.linear_constraints {
            Some(b) => (
                Some(b.matrix.clone()),
                b.lower_bounds.clone(),
                b.upper_bounds.clone(),
            ),
            None => (None, None, None),
        };
        let has_previous = self.previous_portfolio.is_some();
        SolverPayload {
            assets_utility_matrix: self.partition.embed(&self.kept_utility_matrix),
            assets_to_benchmark_utility_vector: self.partition.embed_vector(&self.kept_utility_vector),
            portfolio_size: self.portfolio_size,
            asset_names: self.asset_names.clone(),
            minimum_weight: self.minimum_weight,
            maximum_weight: self.maximum_weight,
            sum_of_portfolio_weights: self.sum_of_portfolio_weights,
            random_number_generator_seed: self.seed,
            description: self.description.clone(),
            linear_constraints_matrix: lin_matrix,
            lower_bounds_vector: lin_lower,
            upper_bounds_vector: lin_upper,
            previous_portfolio: self.previous_portfolio.clone(),
            max_companies_rotation: has_previous.then(|| {
                self.rotation
                    .max_companies
                    .map(i64::from)
                    .unwrap_or(UNSET_ROTATION_LIMIT)
            }),
            max_sales_rotation: has_previous.then(|| {
                self.rotation
                    .max_sales
                    .unwrap_or(UNSET_ROTATION_LIMIT as f64)
            }),
            sectorial_distribution: self.sectors.as_ref().map(|s| s.distribution.clone()),
            sectorial_weights: self.sectors.as_ref().map(|s| s.weights.clone()),
            sectorial_weight_tolerance: self.sectors.as_ref().map(|s| s.tolerance),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn validate_asset_names(names: &[AssetName], n: usize) -> IndexTrackingResult<()> {
    if names.len() != n {
        return Err(IndexTrackingError::Shape {
            field: "asset_names".into(),
            reason: format!(
                "has size {}, but its size must be equal to the dimensions of the assets utility matrix: {}",
                names.len(),
                n
            ),
        });
    }
    let mut seen = HashSet::with_capacity(n);
    if let Some(dup) = names.iter().find(|name| !seen.insert(name.as_str())) {
        return Err(IndexTrackingError::InvalidInput {
            field: "asset_names".into(),
            reason: format!("identifier '{}' appears more than once", dup),
        });
    }
    Ok(())
}

/// Excluded rows and columns must be zero off the diagonal, and the benchmark
/// coupling of an excluded asset must be zero.
fn validate_sentinels(
    matrix: &[Vec<f64>],
    vector: &[f64],
    partition: &AssetPartition,
) -> IndexTrackingResult<()> {
    for &d in &partition.dropped {
        let stray = (0..matrix.len()).find(|&j| j != d && (matrix[d][j] != 0.0 || matrix[j][d] != 0.0));
        if let Some(j) = stray {
            return Err(IndexTrackingError::InvalidInput {
                field: format!("assets_utility_matrix[{}][{}]", d, j),
                reason: format!(
                    "asset {} is excluded ({} on the diagonal) but its row or column is not zero",
                    d, EXCLUDED_DIAGONAL
                ),
            });
        }
        if vector[d] != 0.0 {
            return Err(IndexTrackingError::InvalidInput {
                field: format!("assets_to_benchmark_utility_vector[{}]", d),
                reason: format!("asset {} is excluded but its benchmark utility is {}", d, vector[d]),
            });
        }
    }
    Ok(())
}

fn validate_linear_constraints(
    input: &ProblemInput,
    n: usize,
) -> IndexTrackingResult<Option<ConstraintBlock>> {
    let matrix = match &input.linear_constraints_matrix {
        Some(m) => m,
        None => {
            if input.lower_bounds_vector.is_some() || input.upper_bounds_vector.is_some() {
                warn!("bound vectors given without a linear constraints matrix are ignored");
            }
            return Ok(None);
        }
    };
    if input.lower_bounds_vector.is_none() && input.upper_bounds_vector.is_none() {
        return Err(IndexTrackingError::IncompleteSpecification {
            field: "linear_constraints_matrix".into(),
            reason: "a matrix of linear inequalities was given, but both 'lower_bounds_vector' \
                     and 'upper_bounds_vector' are missing"
                .into(),
        });
    }
    let (rows, cols) = validate::matrix(matrix, "linear_constraints_matrix", MatrixChecks::default())?;
    if cols != n {
        return Err(IndexTrackingError::Shape {
            field: "linear_constraints_matrix".into(),
            reason: format!(
                "its rows have {} columns, which does not match the {} assets of the utility matrix",
                cols, n
            ),
        });
    }
    let dims = Some((rows, "the number of linear inequalities"));
    if let Some(lb) = &input.lower_bounds_vector {
        validate::vector(lb, "lower_bounds_vector", dims, MAX_ARRAY_DIM)?;
    }
    if let Some(ub) = &input.upper_bounds_vector {
        validate::vector(ub, "upper_bounds_vector", dims, MAX_ARRAY_DIM)?;
    }
    if let (Some(lb), Some(ub)) = (&input.lower_bounds_vector, &input.upper_bounds_vector) {
        if let Some(i) = (0..rows).find(|&i| lb[i] > ub[i]) {
            return Err(IndexTrackingError::Feasibility {
                field: format!("lower_bounds_vector[{}]", i),
                reason: format!("lower bound {} exceeds upper bound {}", lb[i], ub[i]),
            });
        }
    }
    Ok(Some(ConstraintBlock {
        matrix: matrix.clone(),
        lower_bounds: input.lower_bounds_vector.clone(),
        upper_bounds: input.upper_bounds_vector.clone(),
    }))
}

fn validate_sectors(input: &ProblemInput) -> IndexTrackingResult<Option<SectorConstraints>> {
    let distribution = match &input.sectorial_distribution {
        Some(d) => d,
        None => {
            if input.sectorial_weights.is_some() || input.sectorial_weight_tolerance.is_some() {
                warn!("sector weights or tolerance given without a sector distribution are ignored");
            }
            return Ok(None);
        }
    };
    let (weights, tolerance) = match (&input.sectorial_weights, input.sectorial_weight_tolerance) {
        (Some(w), Some(t)) => (w, t),
        _ => {
            return Err(IndexTrackingError::IncompleteSpecification {
                field: "sectorial_distribution".into(),
                reason: "the sector distribution was given, but 'sectorial_weight_tolerance' \
                         and/or 'sectorial_weights' are missing"
                    .into(),
            })
        }
    };
    let block = build_sector_constraints(&input.asset_names, weights, distribution, tolerance)?;
    Ok(Some(SectorConstraints {
        weights: weights.clone(),
        distribution: distribution.clone(),
        tolerance,
        block,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<AssetName> {
        (0..n).map(|i| format!("A{}", i)).collect()
    }

    /// Diagonally dominant, hence positive definite.
    fn spd(n: usize) -> Matrix {
        (0..n)
            .map(|i| (0..n).map(|j| if i == j { 2.0 } else { 0.1 }).collect())
            .collect()
    }

    fn base(n: usize, k: i64) -> ProblemInput {
        ProblemInput::new(spd(n), vec![0.5; n], k, names(n))
    }

    /// Assets 1 and 3 of five excluded.
    fn with_sentinels() -> ProblemInput {
        let mut inp = base(5, 2);
        for d in [1, 3] {
            for j in 0..5 {
                inp.assets_utility_matrix[d][j] = 0.0;
                inp.assets_utility_matrix[j][d] = 0.0;
            }
            inp.assets_utility_matrix[d][d] = -1.0;
            inp.assets_to_benchmark_utility_vector[d] = 0.0;
        }
        inp
    }

    #[test]
    fn test_accepts_well_formed_instance() {
        let inst = validate_problem(&base(4, 2)).unwrap();
        assert_eq!(inst.num_kept(), 4);
        assert_eq!(inst.portfolio_size(), 2);
        assert_eq!(inst.seed(), 123321);
    }

    #[test]
    fn test_rejects_non_square() {
        let mut inp = base(3, 1);
        inp.assets_utility_matrix.pop();
        assert!(matches!(
            validate_problem(&inp),
            Err(IndexTrackingError::Shape { .. })
        ));
    }

    #[test]
    fn test_rejects_asymmetric() {
        let mut inp = base(3, 1);
        inp.assets_utility_matrix[0][2] = 0.3;
        assert!(matches!(
            validate_problem(&inp),
            Err(IndexTrackingError::Symmetry { row: 0, col: 2, .. })
        ));
    }

    #[test]
    fn test_rejects_vector_and_name_lengths() {
        let mut inp = base(3, 1);
        inp.assets_to_benchmark_utility_vector.push(0.0);
        let err = validate_problem(&inp).unwrap_err();
        assert_eq!(err.field(), Some("assets_to_benchmark_utility_vector"));

        let mut inp = base(3, 1);
        inp.asset_names.pop();
        let err = validate_problem(&inp).unwrap_err();
        assert_eq!(err.field(), Some("asset_names"));
    }

    #[test]
    fn test_rejects_non_psd_kept_matrix() {
        let mut inp = base(3, 1);
        inp.assets_utility_matrix = vec![
            vec![1.0, 2.0, 0.0],
            vec![2.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        assert!(matches!(
            validate_problem(&inp),
            Err(IndexTrackingError::PositiveSemidefinite { .. })
        ));
    }

    #[test]
    fn test_sentinel_rows_excluded_from_psd_check() {
        let inst = validate_problem(&with_sentinels()).unwrap();
        assert_eq!(inst.partition().dropped, vec![1, 3]);
        assert_eq!(inst.kept_asset_names(), vec!["A0", "A2", "A4"]);
        assert_eq!(inst.kept_utility_matrix().len(), 3);
    }

    #[test]
    fn test_payload_restores_sentinels() {
        let inp = with_sentinels();
        let payload = validate_problem(&inp).unwrap().to_payload();
        assert_eq!(payload.assets_utility_matrix, inp.assets_utility_matrix);
        assert_eq!(
            payload.assets_to_benchmark_utility_vector,
            inp.assets_to_benchmark_utility_vector
        );
    }

    #[test]
    fn test_stray_entry_in_excluded_row_rejected() {
        let mut inp = with_sentinels();
        inp.assets_utility_matrix[1][0] = 0.2;
        inp.assets_utility_matrix[0][1] = 0.2;
        assert!(matches!(
            validate_problem(&inp),
            Err(IndexTrackingError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_portfolio_size_bounds_use_kept_count() {
        let mut inp = with_sentinels();
        inp.portfolio_size = 3;
        let err = validate_problem(&inp).unwrap_err();
        assert!(matches!(err, IndexTrackingError::Feasibility { .. }));
        inp.portfolio_size = 0;
        assert!(matches!(
            validate_problem(&inp),
            Err(IndexTrackingError::Feasibility { .. })
        ));
        inp.portfolio_size = -2;
        assert!(validate_problem(&inp).is_err());
    }

    #[test]
    fn test_linear_constraints_need_a_bound_vector() {
        let mut inp = base(3, 1);
        inp.linear_constraints_matrix = Some(vec![vec![1.0, 1.0, 1.0]]);
        assert!(matches!(
            validate_problem(&inp),
            Err(IndexTrackingError::IncompleteSpecification { .. })
        ));
        inp.lower_bounds_vector = Some(vec![0.1]);
        let inst = validate_problem(&inp).unwrap();
        assert_eq!(inst.linear_constraints().map(|b| b.rows()), Some(1));
    }

    #[test]
    fn test_linear_constraints_column_count() {
        let mut inp = base(3, 1);
        inp.linear_constraints_matrix = Some(vec![vec![1.0, 1.0]]);
        inp.upper_bounds_vector = Some(vec![0.9]);
        let err = validate_problem(&inp).unwrap_err();
        assert_eq!(err.field(), Some("linear_constraints_matrix"));
    }

    #[test]
    fn test_bound_vector_length() {
        let mut inp = base(3, 1);
        inp.linear_constraints_matrix = Some(vec![vec![1.0, 1.0, 1.0]]);
        inp.upper_bounds_vector = Some(vec![0.9, 0.8]);
        let err = validate_problem(&inp).unwrap_err();
        assert_eq!(err.field(), Some("upper_bounds_vector"));
    }

    #[test]
    fn test_weight_bounds() {
        let inp = base(4, 2).with_weight_bounds(0.6, 0.4);
        assert_eq!(validate_problem(&inp).unwrap_err().field(), Some("maximum_weight"));
        let inp = base(4, 2).with_weight_bounds(-0.1, 0.4);
        assert_eq!(validate_problem(&inp).unwrap_err().field(), Some("minimum_weight"));
        let inp = base(4, 2).with_weight_bounds(0.0, 1.2);
        assert_eq!(validate_problem(&inp).unwrap_err().field(), Some("maximum_weight"));
    }

    #[test]
    fn test_cardinality_cannot_reach_total_weight() {
        let inp = base(4, 2).with_weight_bounds(0.0, 0.3);
        assert!(matches!(
            validate_problem(&inp),
            Err(IndexTrackingError::Feasibility { .. })
        ));
    }

    #[test]
    fn test_seed_range() {
        let inp = base(4, 2).with_seed(u32::MAX as i64 + 1);
        assert_eq!(
            validate_problem(&inp).unwrap_err().field(),
            Some("random_number_generator_seed")
        );
    }

    #[test]
    fn test_negative_seed_is_range_error() {
        let inp: ProblemInput = serde_json::from_value(serde_json::json!({
            "assets_utility_matrix": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            "assets_to_benchmark_utility_vector": [0.1, 0.2, 0.3],
            "portfolio_size": 2,
            "asset_names": ["A", "B", "C"],
            "random_number_generator_seed": -5
        }))
        .unwrap();
        match validate_problem(&inp) {
            Err(IndexTrackingError::Range { field, value, .. }) => {
                assert_eq!(field, "random_number_generator_seed");
                assert_eq!(value, "-5");
            }
            other => panic!("expected a range error, got {:?}", other),
        }
    }

    #[test]
    fn test_equal_weight_total_within_float_noise() {
        // 3 * 0.1 evaluates to 0.30000000000000004.
        let mut inp = base(4, 3).with_weight_bounds(0.1, 0.1);
        inp.sum_of_portfolio_weights = 0.3;
        let inst = validate_problem(&inp).unwrap();
        assert_eq!(inst.portfolio_size(), 3);

        inp.sum_of_portfolio_weights = 0.31;
        assert!(matches!(
            validate_problem(&inp),
            Err(IndexTrackingError::Feasibility { .. })
        ));
    }

    #[test]
    fn test_rotation_defaults_to_unset_sentinel() {
        let prev: BTreeMap<AssetName, f64> = [("A0".to_string(), 0.5), ("A1".to_string(), 0.5)]
            .into_iter()
            .collect();
        let inp = base(4, 2).with_previous_portfolio(prev, RotationLimits::default());
        let payload = validate_problem(&inp).unwrap().to_payload();
        assert_eq!(payload.max_companies_rotation, Some(-1));
        assert_eq!(payload.max_sales_rotation, Some(-1.0));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["max_companies_rotation"], -1);
    }

    #[test]
    fn test_rotation_limits_round_trip_through_raw_encoding() {
        let prev: BTreeMap<AssetName, f64> = [("A0".to_string(), 1.0)].into_iter().collect();
        let limits = RotationLimits {
            max_companies: Some(2),
            max_sales: Some(0.25),
        };
        let inst = validate_problem(&base(4, 2).with_previous_portfolio(prev, limits)).unwrap();
        assert_eq!(inst.rotation_limits(), limits);
    }

    #[test]
    fn test_rotation_below_sentinel_rejected() {
        let prev: BTreeMap<AssetName, f64> = [("A0".to_string(), 1.0)].into_iter().collect();
        let mut inp = base(4, 2).with_previous_portfolio(prev, RotationLimits::default());
        inp.max_companies_rotation = -5;
        assert_eq!(
            validate_problem(&inp).unwrap_err().field(),
            Some("max_companies_rotation")
        );
    }

    #[test]
    fn test_sector_distribution_requires_weights_and_tolerance() {
        let mut inp = base(2, 1);
        inp.sectorial_distribution = Some(
            [("A0".to_string(), "X".to_string()), ("A1".to_string(), "X".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(matches!(
            validate_problem(&inp),
            Err(IndexTrackingError::IncompleteSpecification { .. })
        ));
    }

    #[test]
    fn test_sector_block_stored_with_instance() {
        let n = 4;
        let dist: BTreeMap<AssetName, String> = names(n)
            .into_iter()
            .enumerate()
            .map(|(i, a)| (a, if i % 2 == 0 { "X" } else { "Y" }.to_string()))
            .collect();
        let weights: BTreeMap<String, f64> =
            [("X".to_string(), 0.5), ("Y".to_string(), 0.5)].into_iter().collect();
        let inp = base(n, 2).with_sectors(weights, dist, 0.1);
        let inst = validate_problem(&inp).unwrap();
        let block = &inst.sector_constraints().unwrap().block;
        assert_eq!(block.rows(), 4);
        assert_eq!(inst.combined_constraints().unwrap().unwrap().rows(), 4);

        let json = serde_json::to_value(inst.to_payload()).unwrap();
        assert_eq!(json["sectorial_weight_tolerance"], 0.1);
        assert!(json.get("linear_constraints_matrix").is_none());
    }

    #[test]
    fn test_absent_groups_omitted_from_payload() {
        let json = serde_json::to_value(validate_problem(&base(3, 1)).unwrap().to_payload()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 9);
        assert!(!obj.contains_key("previous_portfolio"));
        assert!(!obj.contains_key("sectorial_weights"));
    }

    #[test]
    fn test_input_defaults_from_json() {
        let inp: ProblemInput = serde_json::from_value(serde_json::json!({
            "assets_utility_matrix": [[1.0, 0.0], [0.0, 1.0]],
            "assets_to_benchmark_utility_vector": [0.1, 0.2],
            "portfolio_size": 1,
            "asset_names": ["A", "B"]
        }))
        .unwrap();
        assert_eq!(inp.maximum_weight, 1.0);
        assert_eq!(inp.max_companies_rotation, -1);
        assert_eq!(inp.random_number_generator_seed, 123321);
        assert_eq!(inp.sum_of_portfolio_weights, 1.0);
    }
}
