use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexTrackingError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Shape error: {field} — {reason}")]
    Shape { field: String, reason: String },

    #[error("Range error: {field} is {value} — {reason}")]
    Range {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Symmetry error: {field}[{row}][{col}] differs from its transpose by {delta}. If suitable, replace it by (A + A^T) / 2")]
    Symmetry {
        field: String,
        row: usize,
        col: usize,
        delta: f64,
    },

    #[error("Positive semidefinite error: {field} has lowest eigenvalue {min_eigenvalue}")]
    PositiveSemidefinite { field: String, min_eigenvalue: f64 },

    #[error("Feasibility error: {field} — {reason}")]
    Feasibility { field: String, reason: String },

    #[error("Incomplete specification: {field} — {reason}")]
    IncompleteSpecification { field: String, reason: String },

    #[error("Missing final price at {date}: {tickers:?} cannot be normalised, so the quadratic distance cannot be computed")]
    MissingFinalPrice { date: String, tickers: Vec<String> },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse classification used when a failure is folded into a solve outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Feasibility,
    Computation,
    Gateway,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Validation",
            ErrorKind::Feasibility => "Feasibility",
            ErrorKind::Computation => "Computation",
            ErrorKind::Gateway => "Gateway",
        }
    }
}

impl IndexTrackingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexTrackingError::InvalidInput { .. }
            | IndexTrackingError::Shape { .. }
            | IndexTrackingError::Range { .. }
            | IndexTrackingError::Symmetry { .. }
            | IndexTrackingError::PositiveSemidefinite { .. }
            | IndexTrackingError::IncompleteSpecification { .. } => ErrorKind::Validation,
            IndexTrackingError::Feasibility { .. } => ErrorKind::Feasibility,
            IndexTrackingError::MissingFinalPrice { .. }
            | IndexTrackingError::InsufficientData(_)
            | IndexTrackingError::SerializationError(_) => ErrorKind::Computation,
            IndexTrackingError::Gateway(_) => ErrorKind::Gateway,
        }
    }

    /// Field the error is tagged with, when it has one.
    pub fn field(&self) -> Option<&str> {
        match self {
            IndexTrackingError::InvalidInput { field, .. }
            | IndexTrackingError::Shape { field, .. }
            | IndexTrackingError::Range { field, .. }
            | IndexTrackingError::Symmetry { field, .. }
            | IndexTrackingError::PositiveSemidefinite { field, .. }
            | IndexTrackingError::Feasibility { field, .. }
            | IndexTrackingError::IncompleteSpecification { field, .. } => Some(field.as_str()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for IndexTrackingError {
    fn from(e: serde_json::Error) -> Self {
        IndexTrackingError::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = IndexTrackingError::Feasibility {
            field: "portfolio_size".into(),
            reason: "too large".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Feasibility);
        assert_eq!(err.field(), Some("portfolio_size"));

        let err = IndexTrackingError::PositiveSemidefinite {
            field: "assets_utility_matrix".into(),
            min_eigenvalue: -0.5,
        };
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = IndexTrackingError::InsufficientData("empty window".into());
        assert_eq!(err.kind(), ErrorKind::Computation);
        assert_eq!(err.field(), None);
    }

    #[test]
    fn test_range_message_carries_value() {
        let err = IndexTrackingError::Range {
            field: "minimum_weight".into(),
            value: "-0.1".into(),
            reason: "must be non-negative".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("minimum_weight"));
        assert!(msg.contains("-0.1"));
    }
}
