//! Generic shape, type and range checks shared by every other component.
//!
//! Every failure names the offending field and, for scalars, the received
//! value, so callers can surface it without re-deriving context.

use nalgebra::DMatrix;
use rand::Rng;
use std::collections::BTreeMap;

use crate::error::IndexTrackingError;
use crate::IndexTrackingResult;

/// Largest matrix dimension accepted anywhere in the pipeline.
pub const MAX_ARRAY_DIM: usize = 2048;

/// Default absolute/relative tolerance for symmetry and semidefiniteness.
pub const DEFAULT_TOLERANCE: f64 = 1e-7;

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Finite real with optional inclusive bounds.
pub fn real(value: f64, min: Option<f64>, max: Option<f64>, field: &str) -> IndexTrackingResult<f64> {
    if !value.is_finite() {
        return Err(range_error(field, value, "must be a finite number"));
    }
    if let Some(lo) = min {
        if value < lo {
            return Err(range_error(
                field,
                value,
                &format!("less than its minimum value {}", lo),
            ));
        }
    }
    if let Some(hi) = max {
        if value > hi {
            return Err(range_error(
                field,
                value,
                &format!("larger than its maximum value {}", hi),
            ));
        }
    }
    Ok(value)
}

/// Integer within the inclusive range `[min, max]`.
pub fn integer(value: i64, min: i64, max: i64, field: &str) -> IndexTrackingResult<i64> {
    if value < min || value > max {
        return Err(IndexTrackingError::Range {
            field: field.into(),
            value: value.to_string(),
            reason: format!("out of range [{}, {}]", min, max),
        });
    }
    Ok(value)
}

/// RNG seed forwarded to the solver; must fit an unsigned 32-bit integer.
pub fn seed(value: i64) -> IndexTrackingResult<u32> {
    u32::try_from(value).map_err(|_| IndexTrackingError::Range {
        field: "random_number_generator_seed".into(),
        value: value.to_string(),
        reason: format!("out of range [0, {}]", u32::MAX),
    })
}

/// Draw a solver seed from a caller-owned generator.
pub fn seed_from_rng<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.gen_range(0..=u32::MAX)
}

fn range_error(field: &str, value: f64, reason: &str) -> IndexTrackingError {
    IndexTrackingError::Range {
        field: field.into(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Vectors and mappings
// ---------------------------------------------------------------------------

/// Length and finiteness check. When `expected_len` is given the length must
/// match it exactly; it must never exceed `max_len`.
pub fn vector(
    values: &[f64],
    field: &str,
    expected_len: Option<(usize, &str)>,
    max_len: usize,
) -> IndexTrackingResult<()> {
    if let Some((len, what)) = expected_len {
        if values.len() != len {
            return Err(IndexTrackingError::Shape {
                field: field.into(),
                reason: format!(
                    "has size {}, but its size must be equal to {}: {}",
                    values.len(),
                    what,
                    len
                ),
            });
        }
    }
    if values.len() > max_len {
        return Err(IndexTrackingError::Shape {
            field: field.into(),
            reason: format!(
                "has size {}, while the maximum allowed size is {}",
                values.len(),
                max_len
            ),
        });
    }
    if let Some((i, v)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(IndexTrackingError::Range {
            field: format!("{}[{}]", field, i),
            value: v.to_string(),
            reason: "must be a finite number".into(),
        });
    }
    Ok(())
}

/// Every value of a string-keyed mapping is finite and within bounds.
pub fn mapping_values(
    map: &BTreeMap<String, f64>,
    field: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> IndexTrackingResult<()> {
    for (key, &v) in map {
        real(v, min, max, &format!("{}[{}]", field, key))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Matrices
// ---------------------------------------------------------------------------

/// Which properties [`matrix`] enforces.
#[derive(Debug, Clone, Copy)]
pub struct MatrixChecks {
    pub max_rows: usize,
    pub max_cols: usize,
    pub square: bool,
    pub symmetric: bool,
    pub positive_semidefinite: bool,
    pub tolerance: f64,
}

impl Default for MatrixChecks {
    fn default() -> Self {
        MatrixChecks {
            max_rows: MAX_ARRAY_DIM,
            max_cols: MAX_ARRAY_DIM,
            square: false,
            symmetric: false,
            positive_semidefinite: false,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl MatrixChecks {
    pub fn square_symmetric() -> Self {
        MatrixChecks {
            square: true,
            symmetric: true,
            ..Default::default()
        }
    }

    pub fn symmetric_psd() -> Self {
        MatrixChecks {
            positive_semidefinite: true,
            ..Self::square_symmetric()
        }
    }
}

/// Validate a row-major matrix. Returns `(rows, cols)`.
pub fn matrix(rows: &[Vec<f64>], field: &str, checks: MatrixChecks) -> IndexTrackingResult<(usize, usize)> {
    let n_rows = rows.len();
    let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);

    if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_cols) {
        return Err(IndexTrackingError::Shape {
            field: field.into(),
            reason: format!(
                "is not a matrix: row {} has {} entries, row 0 has {}",
                i,
                r.len(),
                n_cols
            ),
        });
    }
    if n_rows > checks.max_rows || n_cols > checks.max_cols {
        return Err(IndexTrackingError::Shape {
            field: field.into(),
            reason: format!(
                "exceeds the maximum dimensions: it has shape ({}, {}), maximum is ({}, {})",
                n_rows, n_cols, checks.max_rows, checks.max_cols
            ),
        });
    }
    for (i, row) in rows.iter().enumerate() {
        if let Some((j, v)) = row.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(IndexTrackingError::Range {
                field: format!("{}[{}][{}]", field, i, j),
                value: v.to_string(),
                reason: "must be a finite number".into(),
            });
        }
    }
    if (checks.square || checks.symmetric || checks.positive_semidefinite) && n_rows != n_cols {
        return Err(IndexTrackingError::Shape {
            field: field.into(),
            reason: format!("is not a square matrix: its dimensions are ({}, {})", n_rows, n_cols),
        });
    }
    if checks.symmetric {
        check_symmetric(rows, field, checks.tolerance)?;
    }
    if checks.positive_semidefinite && n_rows > 0 {
        let lowest = min_eigenvalue(rows);
        if lowest < -checks.tolerance {
            return Err(IndexTrackingError::PositiveSemidefinite {
                field: field.into(),
                min_eigenvalue: lowest,
            });
        }
    }
    Ok((n_rows, n_cols))
}

/// Element-wise all-close against the transpose: `|a_ij - a_ji| <= tol + tol * |a_ji|`
/// for every `(i, j)`. Checking each off-diagonal pair once means the
/// relative term uses the smaller magnitude of the two.
fn check_symmetric(rows: &[Vec<f64>], field: &str, tol: f64) -> IndexTrackingResult<()> {
    let n = rows.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (rows[i][j], rows[j][i]);
            let delta = (a - b).abs();
            if delta > tol + tol * b.abs().min(a.abs()) {
                return Err(IndexTrackingError::Symmetry {
                    field: field.into(),
                    row: i,
                    col: j,
                    delta,
                });
            }
        }
    }
    Ok(())
}

/// Lowest eigenvalue of a symmetric matrix. Only the lower triangle is read.
pub fn min_eigenvalue(rows: &[Vec<f64>]) -> f64 {
    let n = rows.len();
    if n == 0 {
        return 0.0;
    }
    let m = DMatrix::from_fn(n, n, |i, j| if i >= j { rows[i][j] } else { rows[j][i] });
    m.symmetric_eigenvalues()
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}
