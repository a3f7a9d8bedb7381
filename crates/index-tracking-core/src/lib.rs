pub mod error;
pub mod types;
pub mod validate;

#[cfg(feature = "utility")]
pub mod utility;

#[cfg(feature = "problem")]
pub mod problem;

pub use error::{ErrorKind, IndexTrackingError};
pub use types::*;

/// Standard result type for all index-tracking operations
pub type IndexTrackingResult<T> = Result<T, IndexTrackingError>;
