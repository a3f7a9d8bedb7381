//! Utility matrix and benchmark vector from a price history.
//!
//! Pipeline: isolate the benchmark as the last column, window the rows by
//! date, filter assets by their fraction of missing prices, transform prices
//! (percentage changes or prices relative to the final in-window price),
//! estimate the EWMA second moment, regularise, re-embed excluded assets as
//! sentinel rows/columns and split off the benchmark.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, warn};

use super::ewma::ewma_second_moment;
use super::missing_data::{drop_missing_final_price, missing_ratios, partition_by_missing_ratio};
use crate::error::IndexTrackingError;
use crate::types::{with_metadata, AssetName, AssetPartition, ComputationOutput, Matrix, PriceTable};
use crate::IndexTrackingResult;

/// Halflife used when none is configured: one trading year.
pub const DEFAULT_HALFLIFE: u32 = 252;

/// Missing-ratio threshold the convenience constructors start from.
pub const DEFAULT_WRAPPER_MISSING_RATIO: Decimal = dec!(0.25);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What the second moment is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostFunction {
    /// Covariance of percentage price changes.
    Covariance,
    /// Second moment of prices normalised by their final in-window price.
    QuadraticDistance,
}

impl CostFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostFunction::Covariance => "covariance",
            CostFunction::QuadraticDistance => "quadratic_distance",
        }
    }

    fn remove_mean(&self) -> bool {
        matches!(self, CostFunction::Covariance)
    }

    fn methodology(&self) -> &'static str {
        match self {
            CostFunction::Covariance => "EWMA covariance of percentage returns",
            CostFunction::QuadraticDistance => "EWMA quadratic distance of normalised prices",
        }
    }
}

impl fmt::Display for CostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CostFunction {
    type Err = IndexTrackingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "covariance" => Ok(CostFunction::Covariance),
            "quadratic_distance" => Ok(CostFunction::QuadraticDistance),
            other => Err(IndexTrackingError::InvalidInput {
                field: "cost_function".into(),
                reason: format!(
                    "'{}' is not valid. Possible values are 'covariance' or 'quadratic_distance'",
                    other
                ),
            }),
        }
    }
}

/// Input for utility estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilityInput {
    pub prices: PriceTable,
    /// Column of `prices` holding the benchmark index.
    pub benchmark: AssetName,
    /// Inclusive window start.
    pub date_from: NaiveDate,
    /// Inclusive window end.
    pub date_to: NaiveDate,
    /// `covariance` or `quadratic_distance`.
    pub cost_function: String,
    /// EWMA halflife in rows (trading days).
    #[serde(default = "default_halflife")]
    pub ewma_halflife: u32,
    /// Largest tolerated fraction of missing prices per asset, in `[0, 1]`.
    #[serde(default)]
    pub max_missing_ratio: Decimal,
    /// Added to the diagonal of the estimated matrix.
    #[serde(default)]
    pub l2_regularization: f64,
}

fn default_halflife() -> u32 {
    DEFAULT_HALFLIFE
}

impl UtilityInput {
    fn with_mode(
        prices: PriceTable,
        benchmark: impl Into<AssetName>,
        date_from: NaiveDate,
        date_to: NaiveDate,
        cost_function: CostFunction,
    ) -> Self {
        UtilityInput {
            prices,
            benchmark: benchmark.into(),
            date_from,
            date_to,
            cost_function: cost_function.as_str().to_string(),
            ewma_halflife: DEFAULT_HALFLIFE,
            max_missing_ratio: DEFAULT_WRAPPER_MISSING_RATIO,
            l2_regularization: 0.0,
        }
    }

    pub fn covariance(
        prices: PriceTable,
        benchmark: impl Into<AssetName>,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Self {
        Self::with_mode(prices, benchmark, date_from, date_to, CostFunction::Covariance)
    }

    pub fn quadratic_distance(
        prices: PriceTable,
        benchmark: impl Into<AssetName>,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Self {
        Self::with_mode(prices, benchmark, date_from, date_to, CostFunction::QuadraticDistance)
    }

    pub fn with_halflife(mut self, halflife: u32) -> Self {
        self.ewma_halflife = halflife;
        self
    }

    pub fn with_max_missing_ratio(mut self, ratio: Decimal) -> Self {
        self.max_missing_ratio = ratio;
        self
    }

    pub fn with_l2_regularization(mut self, l2: f64) -> Self {
        self.l2_regularization = l2;
        self
    }
}

/// Estimated utility over the non-benchmark assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilityOutput {
    /// `n x n`; excluded assets carry `-1` on the diagonal and zeros elsewhere.
    pub utility_matrix: Matrix,
    /// Per-asset coupling to the benchmark; zero for excluded assets.
    pub utility_vector: Vec<f64>,
    /// Asset order of the matrix rows, benchmark excluded.
    pub asset_names: Vec<AssetName>,
    /// Kept / excluded indices into `asset_names`.
    pub partition: AssetPartition,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    /// Rows that entered the EWMA after the transformation.
    pub observations: usize,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Estimate the utility matrix and benchmark vector, mode taken from the input.
pub fn compute_quadratic_utility(
    input: &UtilityInput,
) -> IndexTrackingResult<ComputationOutput<UtilityOutput>> {
    let mode = CostFunction::from_str(&input.cost_function)?;
    compute_with_mode(input, mode)
}

/// Covariance of percentage returns regardless of `input.cost_function`.
pub fn compute_covariance_matrix(
    input: &UtilityInput,
) -> IndexTrackingResult<ComputationOutput<UtilityOutput>> {
    compute_with_mode(input, CostFunction::Covariance)
}

/// Quadratic distance of normalised prices regardless of `input.cost_function`.
pub fn compute_cumulative_returns_distance_matrix(
    input: &UtilityInput,
) -> IndexTrackingResult<ComputationOutput<UtilityOutput>> {
    compute_with_mode(input, CostFunction::QuadraticDistance)
}

fn compute_with_mode(
    input: &UtilityInput,
    mode: CostFunction,
) -> IndexTrackingResult<ComputationOutput<UtilityOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let benchmark_col = validate_utility_input(input)?;
    let prices = &input.prices;

    // Benchmark moves to the last position; the rest keep their order.
    let order: Vec<usize> = (0..prices.columns.len())
        .filter(|&c| c != benchmark_col)
        .chain(std::iter::once(benchmark_col))
        .collect();
    let num_assets = order.len() - 1;
    let asset_names: Vec<AssetName> = order[..num_assets]
        .iter()
        .map(|&c| prices.columns[c].clone())
        .collect();

    let (dates, window) = window_rows(prices, &order, input.date_from, input.date_to);
    let (window_start, window_end) = match (dates.first(), dates.last()) {
        (Some(&a), Some(&b)) => (a, b),
        _ => {
            return Err(IndexTrackingError::InsufficientData(format!(
                "no prices between {} and {}",
                input.date_from, input.date_to
            )))
        }
    };
    debug!(
        rows = window.len(),
        assets = num_assets,
        %window_start,
        %window_end,
        "windowed price table"
    );

    // The benchmark is exempt from the missing-ratio filter.
    let ratios = missing_ratios(&window, num_assets);
    let asset_partition = partition_by_missing_ratio(&ratios, input.max_missing_ratio);
    for &i in &asset_partition.dropped {
        let msg = format!(
            "Asset {} excluded: {}% of prices missing exceeds the tolerated {}%",
            asset_names[i],
            (ratios[i] * dec!(100)).round_dp(2),
            (input.max_missing_ratio * dec!(100)).round_dp(2)
        );
        warn!("{}", msg);
        warnings.push(msg);
    }
    let mut kept = asset_partition.kept;
    kept.push(num_assets);
    let mut partition = AssetPartition::from_kept(kept, num_assets + 1);

    if mode == CostFunction::QuadraticDistance {
        let last = &window[window.len() - 1];
        if !matches!(last[num_assets], Some(p) if p > 0.0) {
            return Err(IndexTrackingError::MissingFinalPrice {
                date: window_end.to_string(),
                tickers: vec![input.benchmark.clone()],
            });
        }
        let (refined, moved) = drop_missing_final_price(partition, last);
        for i in moved {
            let msg = format!(
                "Asset {} excluded: no usable price on {} to normalise by",
                asset_names[i], window_end
            );
            warn!("{}", msg);
            warnings.push(msg);
        }
        partition = refined;
    }

    let kept_rows: Vec<Vec<Option<f64>>> = window
        .iter()
        .map(|row| partition.kept.iter().map(|&j| row[j]).collect())
        .collect();
    let samples = match mode {
        CostFunction::Covariance => percentage_changes(&kept_rows),
        CostFunction::QuadraticDistance => normalise_by_last(&kept_rows),
    };
    if samples.is_empty() {
        return Err(IndexTrackingError::InsufficientData(format!(
            "window {} to {} leaves no observations after the {} transformation",
            window_start, window_end, mode
        )));
    }

    let mut estimate = ewma_second_moment(&samples, input.ewma_halflife as f64, mode.remove_mean())?;
    for (i, row) in estimate.iter_mut().enumerate() {
        row[i] += input.l2_regularization;
    }

    let undefined = undefined_pairs(&estimate, &partition, &asset_names, &input.benchmark);
    if !undefined.is_empty() {
        let msg = format!(
            "{} pair statistic(s) undefined for lack of overlapping observations: {}",
            undefined.len(),
            undefined.join(", ")
        );
        warn!("{}", msg);
        warnings.push(msg);
    }

    let full = partition.embed(&estimate);
    let utility_matrix: Matrix = full[..num_assets]
        .iter()
        .map(|row| row[..num_assets].to_vec())
        .collect();
    let utility_vector: Vec<f64> = full[..num_assets].iter().map(|row| row[num_assets]).collect();
    let asset_partition = AssetPartition::from_kept(
        partition
            .kept
            .iter()
            .copied()
            .filter(|&i| i < num_assets)
            .collect(),
        num_assets,
    );

    debug!(
        kept = asset_partition.num_kept(),
        dropped = asset_partition.dropped.len(),
        observations = samples.len(),
        "utility matrix built"
    );

    let output = UtilityOutput {
        utility_matrix,
        utility_vector,
        asset_names,
        partition: asset_partition,
        window_start,
        window_end,
        observations: samples.len(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        mode.methodology(),
        &serde_json::json!({
            "benchmark": input.benchmark,
            "cost_function": mode.as_str(),
            "ewma_halflife": input.ewma_halflife,
            "max_missing_ratio": input.max_missing_ratio.to_string(),
            "l2_regularization": input.l2_regularization,
            "returns_in_percent": mode == CostFunction::Covariance,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns the benchmark's column index.
fn validate_utility_input(input: &UtilityInput) -> IndexTrackingResult<usize> {
    input.prices.check()?;
    let benchmark_col =
        input
            .prices
            .column_index(&input.benchmark)
            .ok_or_else(|| IndexTrackingError::InvalidInput {
                field: "benchmark".into(),
                reason: format!(
                    "benchmark column '{}' is not in the price table",
                    input.benchmark
                ),
            })?;
    if input.prices.columns.len() < 2 {
        return Err(IndexTrackingError::Shape {
            field: "prices".into(),
            reason: "the price table needs at least one column besides the benchmark".into(),
        });
    }
    if input.max_missing_ratio < Decimal::ZERO || input.max_missing_ratio > Decimal::ONE {
        return Err(IndexTrackingError::Range {
            field: "max_missing_ratio".into(),
            value: input.max_missing_ratio.to_string(),
            reason: "out of bounds [0, 1]".into(),
        });
    }
    if input.ewma_halflife == 0 {
        return Err(IndexTrackingError::Range {
            field: "ewma_halflife".into(),
            value: "0".into(),
            reason: "must be a positive number of periods".into(),
        });
    }
    if !(input.l2_regularization.is_finite() && input.l2_regularization >= 0.0) {
        return Err(IndexTrackingError::Range {
            field: "l2_regularization".into(),
            value: input.l2_regularization.to_string(),
            reason: "must be finite and non-negative".into(),
        });
    }
    if input.date_from > input.date_to {
        return Err(IndexTrackingError::InvalidInput {
            field: "date_from".into(),
            reason: format!("{} is after date_to {}", input.date_from, input.date_to),
        });
    }
    Ok(benchmark_col)
}

/// Rows inside `[from, to]`, ascending by date, columns permuted by `order`.
fn window_rows(
    prices: &PriceTable,
    order: &[usize],
    from: NaiveDate,
    to: NaiveDate,
) -> (Vec<NaiveDate>, Vec<Vec<Option<f64>>>) {
    let mut rows: Vec<_> = prices
        .rows
        .iter()
        .filter(|r| r.date >= from && r.date <= to)
        .collect();
    rows.sort_by_key(|r| r.date);
    let dates = rows.iter().map(|r| r.date).collect();
    let cells = rows
        .iter()
        .map(|r| order.iter().map(|&c| r.prices[c]).collect())
        .collect();
    (dates, cells)
}

/// `100 * (p_t / p_{t-1} - 1)`; missing when either price is missing or the
/// previous price is zero. Rows with no change at all are dropped.
fn percentage_changes(rows: &[Vec<Option<f64>>]) -> Vec<Vec<Option<f64>>> {
    rows.windows(2)
        .map(|pair| {
            pair[0]
                .iter()
                .zip(pair[1].iter())
                .map(|(prev, cur)| match (prev, cur) {
                    (Some(p), Some(c)) if *p != 0.0 => Some(100.0 * (c / p - 1.0)),
                    _ => None,
                })
                .collect::<Vec<_>>()
        })
        .filter(|row| row.iter().any(Option::is_some))
        .collect()
}

/// Every price divided by the column's final price. Callers guarantee the
/// final row is fully populated with positive prices.
fn normalise_by_last(rows: &[Vec<Option<f64>>]) -> Vec<Vec<Option<f64>>> {
    let last = match rows.last() {
        Some(r) => r.clone(),
        None => return Vec::new(),
    };
    rows.iter()
        .map(|row| {
            row.iter()
                .zip(last.iter())
                .map(|(p, l)| match (p, l) {
                    (Some(p), Some(l)) => Some(p / l),
                    _ => None,
                })
                .collect()
        })
        .collect()
}

fn undefined_pairs(
    estimate: &[Vec<f64>],
    partition: &AssetPartition,
    asset_names: &[AssetName],
    benchmark: &str,
) -> Vec<String> {
    let name = |k: usize| -> &str {
        let i = partition.kept[k];
        asset_names.get(i).map(String::as_str).unwrap_or(benchmark)
    };
    let mut out = Vec::new();
    for a in 0..estimate.len() {
        for b in a..estimate.len() {
            if !estimate[a][b].is_finite() {
                out.push(format!("{}/{}", name(a), name(b)));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceRow;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn table(columns: &[&str], rows: Vec<(u32, Vec<Option<f64>>)>) -> PriceTable {
        PriceTable::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.into_iter()
                .map(|(day, prices)| PriceRow { date: d(day), prices })
                .collect(),
        )
        .unwrap()
    }

    fn base_table() -> PriceTable {
        table(
            &["IDX", "AAA", "BBB"],
            vec![
                (2, vec![Some(100.0), Some(10.0), Some(20.0)]),
                (3, vec![Some(101.0), Some(10.2), Some(19.8)]),
                (4, vec![Some(100.5), Some(10.1), Some(20.1)]),
                (5, vec![Some(102.0), Some(10.4), Some(20.0)]),
                (8, vec![Some(103.0), Some(10.5), Some(20.3)]),
            ],
        )
    }

    fn input(mode: &str) -> UtilityInput {
        UtilityInput {
            prices: base_table(),
            benchmark: "IDX".into(),
            date_from: d(1),
            date_to: d(31),
            cost_function: mode.into(),
            ewma_halflife: 10,
            max_missing_ratio: Decimal::ZERO,
            l2_regularization: 0.0,
        }
    }

    #[test]
    fn test_cost_function_parse() {
        assert_eq!(
            "covariance".parse::<CostFunction>().unwrap(),
            CostFunction::Covariance
        );
        let err = "variance".parse::<CostFunction>().unwrap_err();
        assert!(matches!(err, IndexTrackingError::InvalidInput { .. }));
    }

    #[test]
    fn test_benchmark_excluded_from_assets() {
        let out = compute_quadratic_utility(&input("covariance")).unwrap().result;
        assert_eq!(out.asset_names, vec!["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(out.utility_matrix.len(), 2);
        assert_eq!(out.utility_vector.len(), 2);
        assert_eq!(out.observations, 4);
    }

    #[test]
    fn test_covariance_matches_hand_computation_for_diagonal() {
        let mut inp = input("covariance");
        inp.ewma_halflife = 1;
        let out = compute_quadratic_utility(&inp).unwrap().result;
        let prices = [10.0, 10.2, 10.1, 10.4, 10.5];
        let r: Vec<f64> = prices.windows(2).map(|p| 100.0 * (p[1] / p[0] - 1.0)).collect();
        let mean = r.iter().sum::<f64>() / r.len() as f64;
        let w: Vec<f64> = (0..4).map(|t| 2f64.powf(-((3 - t) as f64))).collect();
        let num: f64 = r.iter().zip(&w).map(|(x, w)| (x - mean) * (x - mean) * w).sum();
        let den: f64 = w.iter().sum();
        assert!(approx_eq(out.utility_matrix[0][0], num / den, 1e-10));
    }

    #[test]
    fn test_l2_regularization_added_to_diagonal_only() {
        let plain = compute_quadratic_utility(&input("covariance")).unwrap().result;
        let mut inp = input("covariance");
        inp.l2_regularization = 0.5;
        let reg = compute_quadratic_utility(&inp).unwrap().result;
        assert!(approx_eq(reg.utility_matrix[0][0], plain.utility_matrix[0][0] + 0.5, 1e-12));
        assert!(approx_eq(reg.utility_matrix[0][1], plain.utility_matrix[0][1], 1e-12));
        // The benchmark coupling is off-diagonal in the full matrix.
        assert!(approx_eq(reg.utility_vector[1], plain.utility_vector[1], 1e-12));
    }

    #[test]
    fn test_quadratic_distance_normalises_by_last_price() {
        let mut inp = input("quadratic_distance");
        inp.ewma_halflife = 1_000_000;
        let out = compute_quadratic_utility(&inp).unwrap().result;
        let prices = [10.0, 10.2, 10.1, 10.4, 10.5];
        let expected: f64 =
            prices.iter().map(|p| (p / 10.5) * (p / 10.5)).sum::<f64>() / prices.len() as f64;
        assert!(approx_eq(out.utility_matrix[0][0], expected, 1e-6));
    }

    #[test]
    fn test_unknown_cost_function() {
        assert!(matches!(
            compute_quadratic_utility(&input("variance")),
            Err(IndexTrackingError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_unknown_benchmark() {
        let mut inp = input("covariance");
        inp.benchmark = "SPX".into();
        let err = compute_quadratic_utility(&inp).unwrap_err();
        assert_eq!(err.field(), Some("benchmark"));
    }

    #[test]
    fn test_missing_ratio_out_of_bounds() {
        let mut inp = input("covariance");
        inp.max_missing_ratio = dec!(1.5);
        assert!(matches!(
            compute_quadratic_utility(&inp),
            Err(IndexTrackingError::Range { .. })
        ));
        inp.max_missing_ratio = dec!(-0.1);
        assert!(compute_quadratic_utility(&inp).is_err());
    }

    #[test]
    fn test_empty_window() {
        let mut inp = input("covariance");
        inp.date_from = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        inp.date_to = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        assert!(matches!(
            compute_quadratic_utility(&inp),
            Err(IndexTrackingError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_quadratic_distance_missing_benchmark_final_price_fails() {
        let mut inp = input("quadratic_distance");
        inp.prices.rows[4].prices[0] = None;
        inp.max_missing_ratio = dec!(0.5);
        match compute_quadratic_utility(&inp) {
            Err(IndexTrackingError::MissingFinalPrice { tickers, .. }) => {
                assert_eq!(tickers, vec!["IDX".to_string()]);
            }
            other => panic!("expected MissingFinalPrice, got {:?}", other),
        }
    }

    #[test]
    fn test_quadratic_distance_drops_asset_missing_final_price() {
        let mut inp = input("quadratic_distance");
        inp.prices.rows[4].prices[2] = None;
        inp.max_missing_ratio = dec!(0.5);
        let out = compute_quadratic_utility(&inp).unwrap();
        assert_eq!(out.result.partition.dropped, vec![1]);
        assert_eq!(out.result.utility_matrix[1][1], -1.0);
        assert_eq!(out.result.utility_vector[1], 0.0);
        assert!(out.warnings.iter().any(|w| w.contains("BBB")));
    }

    #[test]
    fn test_window_is_sorted_before_slicing() {
        let mut inp = input("covariance");
        inp.prices.rows.reverse();
        let reversed = compute_quadratic_utility(&inp).unwrap().result;
        let ordered = compute_quadratic_utility(&input("covariance")).unwrap().result;
        assert_eq!(reversed.utility_matrix, ordered.utility_matrix);
    }

    #[test]
    fn test_percentage_changes_drop_empty_rows() {
        let rows = vec![
            vec![Some(1.0), None],
            vec![None, None],
            vec![Some(2.0), Some(4.0)],
            vec![Some(3.0), Some(2.0)],
        ];
        let r = percentage_changes(&rows);
        assert_eq!(r.len(), 1);
        assert!(approx_eq(r[0][0].unwrap(), 50.0, 1e-12));
        assert!(approx_eq(r[0][1].unwrap(), -50.0, 1e-12));
    }
}
