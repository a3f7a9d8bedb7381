//! Halflife-weighted second moments over observations with missing cells.
//!
//! Row `t` of a `T`-row sample gets weight `2^(-(T-1-t)/h)`: the latest row
//! weighs 1 and the weight halves every `h` rows back in time.
//!
//! Missing cells are zero-filled in the data and marked 0 in a parallel
//! presence matrix. Each pairwise statistic is the weighted cross-product of
//! the data divided by the weighted cross-product of the presence matrix, so
//! every pair is normalised by the mass of the periods where both series were
//! observed.
//!
//! A pair that never co-occurs has a zero denominator and yields `NaN`. The
//! estimator does not reject it; callers decide what an undefined statistic
//! means.

use tracing::debug;

use crate::error::IndexTrackingError;
use crate::types::Matrix;
use crate::IndexTrackingResult;

/// Exponential weights for `num_samples` time-ordered rows, oldest first.
pub fn ewma_weights(num_samples: usize, halflife: f64) -> Vec<f64> {
    (0..num_samples)
        .map(|t| 2.0_f64.powf(-((num_samples - 1 - t) as f64) / halflife))
        .collect()
}

/// Column means ignoring missing cells. `None` for a column with no data.
pub fn column_means(data: &[Vec<Option<f64>>], num_series: usize) -> Vec<Option<f64>> {
    let mut sums = vec![0.0; num_series];
    let mut counts = vec![0usize; num_series];
    for row in data {
        for (j, cell) in row.iter().enumerate() {
            if let Some(v) = cell {
                sums[j] += v;
                counts[j] += 1;
            }
        }
    }
    sums.iter()
        .zip(counts.iter())
        .map(|(s, &c)| if c == 0 { None } else { Some(s / c as f64) })
        .collect()
}

/// EWMA second-moment matrix (`m x m`) of a `T x m` sample.
///
/// With `remove_mean` the columns are centred on their missing-aware means
/// first, which turns the second moment into a covariance.
pub fn ewma_second_moment(
    data: &[Vec<Option<f64>>],
    halflife: f64,
    remove_mean: bool,
) -> IndexTrackingResult<Matrix> {
    if !(halflife.is_finite() && halflife > 0.0) {
        return Err(IndexTrackingError::Range {
            field: "ewma_halflife".into(),
            value: halflife.to_string(),
            reason: "must be strictly positive".into(),
        });
    }
    if data.is_empty() {
        return Err(IndexTrackingError::InsufficientData(
            "EWMA needs at least one observation".into(),
        ));
    }
    let m = data[0].len();
    if let Some((t, row)) = data.iter().enumerate().find(|(_, r)| r.len() != m) {
        return Err(IndexTrackingError::Shape {
            field: "data".into(),
            reason: format!("row {} has {} series, row 0 has {}", t, row.len(), m),
        });
    }

    let weights = ewma_weights(data.len(), halflife);
    let means = if remove_mean {
        column_means(data, m)
    } else {
        vec![Some(0.0); m]
    };

    // Zero-filled centred values and presence indicators.
    let mut values = vec![vec![0.0; m]; data.len()];
    let mut present = vec![vec![0.0; m]; data.len()];
    for (t, row) in data.iter().enumerate() {
        for (j, cell) in row.iter().enumerate() {
            if let (Some(v), Some(mu)) = (cell, means[j]) {
                values[t][j] = v - mu;
                present[t][j] = 1.0;
            }
        }
    }

    let mut cost = vec![vec![0.0; m]; m];
    for i in 0..m {
        for j in i..m {
            let mut num = 0.0;
            let mut den = 0.0;
            for (t, w) in weights.iter().enumerate() {
                num += values[t][i] * w * values[t][j];
                den += present[t][i] * w * present[t][j];
            }
            let c = num / den;
            cost[i][j] = c;
            cost[j][i] = c;
        }
    }

    debug!(
        samples = data.len(),
        series = m,
        halflife,
        remove_mean,
        "computed EWMA second moment"
    );
    Ok(cost)
}
