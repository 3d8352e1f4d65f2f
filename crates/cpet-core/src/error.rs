// crates/cpet-core/src/error.rs

use cpet_parser::ParserError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Unparseable or ambiguous export; surfaced verbatim with the offending column or section.
    #[error("malformed export: {0}")]
    MalformedExport(#[from] ParserError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("export holds more than {limit} samples")]
    ExportTooLarge { limit: usize },

    #[error("insufficient data at {stage}: found {found} usable samples, need at least {required}")]
    InsufficientData {
        stage: &'static str,
        found: usize,
        required: usize,
    },

    #[error("cohort '{cohort}' has {found} qualifying tests for '{metric}', need at least 2")]
    EmptyCohort {
        cohort: String,
        metric: String,
        found: usize,
    },

    #[error("analysis cancelled before stage '{stage}'")]
    Cancelled { stage: &'static str },

    #[error("result {test_id} v{version} already stored with different content")]
    VersionConflict { test_id: String, version: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Recoverable by the caller (skip the test or collect more data).
    pub fn is_insufficient_data(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientData { .. } | EngineError::EmptyCohort { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
