use rgem_core::errors::GemError;
use std::path::Path;
use thiserror::Error;

/// Errors that stop a simulation or calibration run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Failed to parse {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Model(#[from] GemError),
    #[error(transparent)]
    Calibration(#[from] rgem_calibrate::Error),
}

impl RunError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        RunError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn json(path: &Path, source: serde_json::Error) -> Self {
        RunError::Json {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn csv(path: &Path, source: csv::Error) -> Self {
        RunError::Csv {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type RunResult<T> = Result<T, RunError>;
