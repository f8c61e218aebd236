//! Error types for the decontam library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum DecontamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid count value '{value}' at row {row}, column {col}: counts must be finite and non-negative")]
    InvalidCount {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Duplicate {kind} ID '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Sample ID mismatch: {0}")]
    SampleMismatch(String),

    #[error("Missing column '{0}' in metadata")]
    MissingColumn(String),

    #[error("Invalid variable type for column '{column}': {reason}")]
    InvalidVariableType { column: String, reason: String },

    #[error("Empty table: {0}")]
    EmptyTable(String),

    #[error("Invalid control specification: {0}")]
    InvalidControlSpec(String),

    #[error("Missing covariate: {0}")]
    MissingCovariate(String),

    #[error("Missing control labels: {0}")]
    MissingControlLabel(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Malformed score table: {0}")]
    MalformedScoreTable(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of failures, as surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, missing column or out-of-range parameter.
    InputValidation,
    /// Nothing is left after scoring or filtering.
    EmptyResult,
    /// Numerical failure that prevented any scoring.
    Computation,
    /// File system or (de)serialization failure.
    Io,
}

impl DecontamError {
    /// Shorthand for an [`DecontamError::InvalidParameter`].
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Csv(_) | Self::Yaml(_) | Self::Json(_) => ErrorKind::Io,
            Self::EmptyResult(_) => ErrorKind::EmptyResult,
            Self::Numerical(_) => ErrorKind::Computation,
            Self::InvalidCount { .. }
            | Self::DimensionMismatch { .. }
            | Self::DuplicateId { .. }
            | Self::SampleMismatch(_)
            | Self::MissingColumn(_)
            | Self::InvalidVariableType { .. }
            | Self::EmptyTable(_)
            | Self::InvalidControlSpec(_)
            | Self::MissingCovariate(_)
            | Self::MissingControlLabel(_)
            | Self::InvalidParameter { .. }
            | Self::MalformedScoreTable(_) => ErrorKind::InputValidation,
        }
    }

    /// True for any input validation failure.
    pub fn is_input_validation(&self) -> bool {
        self.kind() == ErrorKind::InputValidation
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, DecontamError>;
