use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::IndexTrackingError;
use crate::IndexTrackingResult;

/// Asset or benchmark identifier (ticker).
pub type AssetName = String;

/// Row-major dense matrix.
pub type Matrix = Vec<Vec<f64>>;

/// Diagonal value that marks an asset excluded from the portfolio.
pub const EXCLUDED_DIAGONAL: f64 = -1.0;

// ---------------------------------------------------------------------------
// Price table
// ---------------------------------------------------------------------------

/// Prices of every column on one date. `None` is a missing price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub prices: Vec<Option<f64>>,
}

/// Date-indexed price history. Column order defines matrix indices downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    pub columns: Vec<AssetName>,
    pub rows: Vec<PriceRow>,
}

impl PriceTable {
    pub fn new(columns: Vec<AssetName>, rows: Vec<PriceRow>) -> IndexTrackingResult<Self> {
        let table = PriceTable { columns, rows };
        table.check()?;
        Ok(table)
    }

    /// Structural checks: unique identifiers, consistent row width, unique dates.
    pub fn check(&self) -> IndexTrackingResult<()> {
        if self.columns.is_empty() {
            return Err(IndexTrackingError::Shape {
                field: "columns".into(),
                reason: "price table has no columns".into(),
            });
        }
        let mut seen = HashSet::with_capacity(self.columns.len());
        for name in &self.columns {
            if !seen.insert(name.as_str()) {
                return Err(IndexTrackingError::InvalidInput {
                    field: "columns".into(),
                    reason: format!("identifier '{}' appears more than once", name),
                });
            }
        }
        let mut dates = HashSet::with_capacity(self.rows.len());
        for row in &self.rows {
            if row.prices.len() != self.columns.len() {
                return Err(IndexTrackingError::Shape {
                    field: "rows".into(),
                    reason: format!(
                        "row {} has {} prices but the table has {} columns",
                        row.date,
                        row.prices.len(),
                        self.columns.len()
                    ),
                });
            }
            if !dates.insert(row.date) {
                return Err(IndexTrackingError::InvalidInput {
                    field: "rows".into(),
                    reason: format!("date {} appears more than once", row.date),
                });
            }
            if let Some(p) = row.prices.iter().flatten().find(|p| !p.is_finite()) {
                return Err(IndexTrackingError::Range {
                    field: "rows".into(),
                    value: p.to_string(),
                    reason: format!("non-finite price on {}; use a missing value instead", row.date),
                });
            }
        }
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Kept / dropped partition
// ---------------------------------------------------------------------------

/// Stable partition of asset indices into those with usable data and those
/// excluded from the optimisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPartition {
    pub kept: Vec<usize>,
    pub dropped: Vec<usize>,
}

impl AssetPartition {
    /// Everything kept.
    pub fn all(n: usize) -> Self {
        AssetPartition {
            kept: (0..n).collect(),
            dropped: Vec::new(),
        }
    }

    /// `kept` must be ascending; `dropped` becomes its complement in `0..n`.
    pub fn from_kept(kept: Vec<usize>, n: usize) -> Self {
        let mut mask = vec![false; n];
        for &i in &kept {
            mask[i] = true;
        }
        let dropped = (0..n).filter(|&i| !mask[i]).collect();
        AssetPartition { kept, dropped }
    }

    /// Recover the partition from the `-1` diagonal encoding.
    pub fn from_sentinel_diagonal(matrix: &[Vec<f64>]) -> Self {
        let kept = matrix
            .iter()
            .enumerate()
            .filter(|(i, row)| row.get(*i).copied() != Some(EXCLUDED_DIAGONAL))
            .map(|(i, _)| i)
            .collect();
        AssetPartition::from_kept(kept, matrix.len())
    }

    pub fn size(&self) -> usize {
        self.kept.len() + self.dropped.len()
    }

    pub fn num_kept(&self) -> usize {
        self.kept.len()
    }

    pub fn is_kept(&self, index: usize) -> bool {
        self.kept.binary_search(&index).is_ok()
    }

    /// Sub-matrix over kept rows and columns.
    pub fn extract(&self, matrix: &[Vec<f64>]) -> Matrix {
        self.kept
            .iter()
            .map(|&i| self.kept.iter().map(|&j| matrix[i][j]).collect())
            .collect()
    }

    /// Place a kept-only matrix back at its original positions. Dropped rows
    /// and columns are zero with `-1` on their own diagonal entry.
    pub fn embed(&self, sub: &[Vec<f64>]) -> Matrix {
        let n = self.size();
        let mut full = vec![vec![0.0; n]; n];
        for (a, &i) in self.kept.iter().enumerate() {
            for (b, &j) in self.kept.iter().enumerate() {
                full[i][j] = sub[a][b];
            }
        }
        for &d in &self.dropped {
            full[d][d] = EXCLUDED_DIAGONAL;
        }
        full
    }

    /// Vector counterpart of [`AssetPartition::embed`]: dropped entries are zero.
    pub fn embed_vector(&self, sub: &[f64]) -> Vec<f64> {
        let mut full = vec![0.0; self.size()];
        for (a, &i) in self.kept.iter().enumerate() {
            full[i] = sub[a];
        }
        full
    }
}

// ---------------------------------------------------------------------------
// Linear constraint blocks
// ---------------------------------------------------------------------------

/// `lower <= matrix . w <= upper`, either side optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintBlock {
    pub matrix: Matrix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bounds: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bounds: Option<Vec<f64>>,
}

impl ConstraintBlock {
    pub fn rows(&self) -> usize {
        self.matrix.len()
    }

    pub fn cols(&self) -> usize {
        self.matrix.first().map(|r| r.len()).unwrap_or(0)
    }

    /// Rewrite as lower bounds only: upper rows become negated lower rows.
    pub fn into_lower_form(self) -> ConstraintBlock {
        let ConstraintBlock {
            matrix,
            lower_bounds,
            upper_bounds,
        } = self;
        let mut rows = Vec::new();
        let mut lower = Vec::new();
        if let Some(lb) = lower_bounds {
            rows.extend(matrix.iter().cloned());
            lower.extend(lb);
        }
        if let Some(ub) = upper_bounds {
            rows.extend(matrix.iter().map(|r| r.iter().map(|v| -v).collect::<Vec<f64>>()));
            lower.extend(ub.iter().map(|v| -v));
        }
        ConstraintBlock {
            matrix: rows,
            lower_bounds: Some(lower),
            upper_bounds: None,
        }
    }

    /// Concatenate blocks over the same asset universe.
    pub fn stack(blocks: Vec<ConstraintBlock>) -> IndexTrackingResult<ConstraintBlock> {
        let cols = match blocks.first() {
            Some(b) => b.cols(),
            None => {
                return Err(IndexTrackingError::Shape {
                    field: "constraint_blocks".into(),
                    reason: "nothing to stack".into(),
                })
            }
        };
        if let Some(b) = blocks.iter().find(|b| b.cols() != cols) {
            return Err(IndexTrackingError::Shape {
                field: "constraint_blocks".into(),
                reason: format!("blocks have {} and {} columns", cols, b.cols()),
            });
        }

        let same_sides = blocks.iter().all(|b| {
            b.lower_bounds.is_some() == blocks[0].lower_bounds.is_some()
                && b.upper_bounds.is_some() == blocks[0].upper_bounds.is_some()
        });
        let blocks: Vec<ConstraintBlock> = if same_sides {
            blocks
        } else {
            blocks.into_iter().map(|b| b.into_lower_form()).collect()
        };

        let has_lower = blocks[0].lower_bounds.is_some();
        let has_upper = blocks[0].upper_bounds.is_some();
        let mut out = ConstraintBlock {
            matrix: Vec::new(),
            lower_bounds: has_lower.then(Vec::new),
            upper_bounds: has_upper.then(Vec::new),
        };
        for b in blocks {
            out.matrix.extend(b.matrix);
            if let (Some(acc), Some(lb)) = (out.lower_bounds.as_mut(), b.lower_bounds) {
                acc.extend(lb);
            }
            if let (Some(acc), Some(ub)) = (out.upper_bounds.as_mut(), b.upper_bounds) {
                acc.extend(ub);
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Output envelope
// ---------------------------------------------------------------------------

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}
