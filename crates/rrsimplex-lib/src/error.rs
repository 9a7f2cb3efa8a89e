use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::io::tabular::CandidateEncoding;

/// Every reportable failure of the RR → simplex pipeline and its artifact store.
#[derive(Debug, Error)]
pub enum SimplexError {
    #[error("could not decode {} with any candidate encoding (tried: {})", path.display(), join_encodings(tried))]
    Decoding {
        path: PathBuf,
        tried: Vec<CandidateEncoding>,
    },

    #[error("Lead '{column}' not found in CSV.")]
    ColumnNotFound { column: String },

    #[error("need at least 2 timestamps to derive a sampling rate, got {found}")]
    InsufficientData { found: usize },

    #[error("timestamps do not advance (mean step {mean_step}); cannot derive a sampling rate")]
    DegenerateTimebase { mean_step: f64 },

    #[error("timestamp '{value}' on data row {row} is not a finite number")]
    InvalidTimestamp { row: usize, value: String },

    #[error("signal contains no valid samples ({len} samples, all invalid)")]
    AllInvalidSignal { len: usize },

    #[error("Not enough valid RR intervals to form triplets ({available} available)")]
    InsufficientIntervals { available: usize },

    #[error("triplet {index} does not have a finite, non-zero sum and cannot be normalized")]
    ZeroSumTriplet { index: usize },

    #[error("RR interval {index} is negative ({value})")]
    NegativeInterval { index: usize, value: f64 },

    #[error("RR interval {index} is not a finite number ({value})")]
    NonFiniteInterval { index: usize, value: f64 },

    #[error("no export items selected")]
    NoExportSelection,

    #[error("none of the requested artifacts exist for '{basename}'")]
    NoExportableArtifacts { basename: String },

    #[error("Invalid file format: expected a .csv file, got '{name}'")]
    UnsupportedFormat { name: String },

    #[error("unsupported image format for '{name}' (expected .png or .svg)")]
    UnsupportedImageFormat { name: String },

    #[error("invalid artifact name '{name}'")]
    InvalidArtifactName { name: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

fn join_encodings(tried: &[CandidateEncoding]) -> String {
    tried
        .iter()
        .map(|e| e.label())
        .collect::<Vec<_>>()
        .join(", ")
}

impl SimplexError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SimplexError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SimplexError::Decoding { .. } => ErrorKind::Decoding,
            SimplexError::ColumnNotFound { .. } => ErrorKind::ColumnNotFound,
            SimplexError::InsufficientData { .. } => ErrorKind::InsufficientData,
            SimplexError::DegenerateTimebase { .. } => ErrorKind::DegenerateTimebase,
            SimplexError::InvalidTimestamp { .. } => ErrorKind::InvalidTimestamp,
            SimplexError::AllInvalidSignal { .. } => ErrorKind::AllInvalidSignal,
            SimplexError::InsufficientIntervals { .. } => ErrorKind::InsufficientIntervals,
            SimplexError::ZeroSumTriplet { .. } => ErrorKind::ZeroSumTriplet,
            SimplexError::NegativeInterval { .. } => ErrorKind::NegativeInterval,
            SimplexError::NonFiniteInterval { .. } => ErrorKind::NonFiniteInterval,
            SimplexError::NoExportSelection => ErrorKind::NoExportSelection,
            SimplexError::NoExportableArtifacts { .. } => ErrorKind::NoExportableArtifacts,
            SimplexError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            SimplexError::UnsupportedImageFormat { .. } => ErrorKind::UnsupportedImageFormat,
            SimplexError::InvalidArtifactName { .. } => ErrorKind::InvalidArtifactName,
            SimplexError::Config(_) => ErrorKind::Config,
            SimplexError::Io { .. } => ErrorKind::Io,
            SimplexError::Csv(_) => ErrorKind::Csv,
            SimplexError::Archive(_) => ErrorKind::Archive,
        }
    }

    /// Client errors are caused by the submitted data or request; everything
    /// else is a fault on our side of the boundary.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Config | ErrorKind::Io | ErrorKind::Csv | ErrorKind::Archive
        )
    }
}

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Decoding,
    ColumnNotFound,
    InsufficientData,
    DegenerateTimebase,
    InvalidTimestamp,
    AllInvalidSignal,
    InsufficientIntervals,
    ZeroSumTriplet,
    NegativeInterval,
    NonFiniteInterval,
    NoExportSelection,
    NoExportableArtifacts,
    UnsupportedFormat,
    UnsupportedImageFormat,
    InvalidArtifactName,
    Config,
    Io,
    Csv,
    Archive,
}

/// Structured failure record handed back across the request boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    pub client_error: bool,
}

impl From<&SimplexError> for Failure {
    fn from(err: &SimplexError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            client_error: err.is_client_error(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimplexError>;
