use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use index_tracking_core::utility::{self, UtilityInput};

use crate::input;

/// Arguments for utility matrix estimation
#[derive(Args)]
pub struct UtilityArgs {
    /// Path to a JSON/YAML utility input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Price CSV: header `date,<id>,...`, ISO dates, empty cell for a missing price
    #[arg(long, conflicts_with = "input")]
    pub prices: Option<String>,

    /// Benchmark column in the price CSV
    #[arg(long)]
    pub benchmark: Option<String>,

    /// First date of the window (inclusive); defaults to the first CSV date
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last date of the window (inclusive); defaults to the last CSV date
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// covariance or quadratic_distance
    #[arg(long, default_value = "covariance")]
    pub cost_function: String,

    /// EWMA halflife in trading days
    #[arg(long, default_value_t = 252)]
    pub halflife: u32,

    /// Largest tolerated fraction of missing prices per asset (0 to 1)
    #[arg(long, default_value = "0")]
    pub max_missing_ratio: Decimal,

    /// L2 regularization added to the diagonal
    #[arg(long, default_value_t = 0.0)]
    pub l2: f64,
}

pub fn run_utility(args: UtilityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let utility_input: UtilityInput = if let Some(ref path) = args.input {
        input::file::read_config(path)?
    } else if let Some(ref path) = args.prices {
        let prices = input::file::read_price_csv(path)?;
        let first = prices.rows.iter().map(|r| r.date).min();
        let last = prices.rows.iter().map(|r| r.date).max();
        UtilityInput {
            benchmark: args
                .benchmark
                .clone()
                .ok_or("--benchmark is required with --prices")?,
            date_from: args
                .from
                .or(first)
                .ok_or("the price file has no rows; pass --from")?,
            date_to: args
                .to
                .or(last)
                .ok_or("the price file has no rows; pass --to")?,
            prices,
            cost_function: args.cost_function.clone(),
            ewma_halflife: args.halflife,
            max_missing_ratio: args.max_missing_ratio,
            l2_regularization: args.l2,
        }
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("Provide --input, --prices or pipe a JSON/YAML document via stdin".into());
    };

    let result = utility::compute_quadratic_utility(&utility_input)?;
    Ok(serde_json::to_value(result)?)
}
