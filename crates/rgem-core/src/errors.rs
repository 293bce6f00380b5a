use thiserror::Error;

/// Error type for invalid model setup or evaluation.
#[derive(Error, Debug)]
pub enum GemError {
    #[error("{0}")]
    Error(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Missing data for {what}: {detail}")]
    MissingData { what: String, detail: String },
    #[error("Dimension mismatch for {name}. Expected {expected}, got {actual}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed table {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

impl GemError {
    pub(crate) fn missing(what: impl Into<String>, detail: impl Into<String>) -> Self {
        GemError::MissingData {
            what: what.into(),
            detail: detail.into(),
        }
    }
}

/// Convenience type for `Result<T, GemError>`.
pub type GemResult<T> = Result<T, GemError>;
