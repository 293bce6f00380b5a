use rgem_core::errors::GemError;
use thiserror::Error;

/// Errors raised while calibrating model parameters.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Sampling error: {0}")]
    SamplingError(String),
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
    #[error("Model error: {0}")]
    Model(#[from] GemError),
    #[error("Malformed table {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
