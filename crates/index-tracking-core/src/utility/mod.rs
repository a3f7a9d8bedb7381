pub mod builder;
pub mod ewma;
pub mod missing_data;

pub use builder::{
    compute_covariance_matrix, compute_cumulative_returns_distance_matrix,
    compute_quadratic_utility, CostFunction, UtilityInput, UtilityOutput,
    DEFAULT_WRAPPER_MISSING_RATIO,
};
