use rust_decimal::Decimal;

use crate::types::AssetPartition;

/// Fraction of missing cells per column, in exact decimal arithmetic.
///
/// An empty sample reports every column as fully missing.
pub fn missing_ratios(rows: &[Vec<Option<f64>>], num_columns: usize) -> Vec<Decimal> {
    if rows.is_empty() {
        return vec![Decimal::ONE; num_columns];
    }
    let total = Decimal::from(rows.len() as u64);
    (0..num_columns)
        .map(|j| {
            let missing = rows.iter().filter(|r| r[j].is_none()).count();
            Decimal::from(missing as u64) / total
        })
        .collect()
}

/// Keep every column whose ratio is at or below `threshold`. Both index sets
/// preserve column order.
pub fn partition_by_missing_ratio(ratios: &[Decimal], threshold: Decimal) -> AssetPartition {
    let kept = ratios
        .iter()
        .enumerate()
        .filter(|(_, r)| **r <= threshold)
        .map(|(i, _)| i)
        .collect();
    AssetPartition::from_kept(kept, ratios.len())
}

/// Move kept columns with no usable price in `last_row` to the dropped set.
/// Returns the partition and the indices that were moved.
pub fn drop_missing_final_price(
    partition: AssetPartition,
    last_row: &[Option<f64>],
) -> (AssetPartition, Vec<usize>) {
    let n = partition.size();
    let (kept, moved): (Vec<usize>, Vec<usize>) = partition
        .kept
        .into_iter()
        .partition(|&i| matches!(last_row[i], Some(p) if p > 0.0));
    (AssetPartition::from_kept(kept, n), moved)
}
