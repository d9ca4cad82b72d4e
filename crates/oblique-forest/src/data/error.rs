//! Dataset construction errors.

/// Errors raised while constructing a [`SurvivalDataset`](super::SurvivalDataset).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatasetError {
    /// The feature matrix has no rows or no columns.
    #[error("dataset is empty: {n_rows} rows, {n_features} features")]
    Empty { n_rows: usize, n_features: usize },

    /// An outcome or weight array does not match the number of feature rows.
    #[error("{field} has {got} entries, expected {expected}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    /// A feature value is NaN or infinite.
    #[error("feature value at row {row}, column {col} is not finite")]
    NonFiniteFeature { row: usize, col: usize },

    /// A time value is non-finite or not strictly positive.
    #[error("time at row {row} must be finite and > 0, got {value}")]
    InvalidTime { row: usize, value: f64 },

    /// A status value is not 0 or 1.
    #[error("status at row {row} must be 0 or 1, got {value}")]
    InvalidStatus { row: usize, value: f64 },

    /// A weight is negative or non-finite.
    #[error("weight at row {row} must be finite and >= 0, got {value}")]
    InvalidWeight { row: usize, value: f64 },

    /// No row has an observed event.
    #[error("dataset has no observed events")]
    NoEvents,
}
