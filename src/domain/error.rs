use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum AppError {
    /// Malformed domain or template definitions. Fatal at load time.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("No candidate matched: {0}")]
    NoCandidateMatched(String),
    /// A malformed extraction rule (regex) supplied by configuration.
    #[error("Extraction rule error: {0}")]
    ExtractionFailure(String),
    #[error("Validation error: {0}")]
    ValidationFailure(String),
    #[error("Verification rejected: {0}")]
    VerificationRejected(String),
    #[error("Query execution error: {0}")]
    QueryExecutionError(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("LLM error: {0}")]
    LLMError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used in outcomes and traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigurationError,
    NoCandidateMatched,
    ExtractionFailure,
    ValidationFailure,
    VerificationRejected,
    QueryExecutionError,
    ConnectionError,
    Cancelled,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ConfigurationError(_) => ErrorKind::ConfigurationError,
            AppError::NoCandidateMatched(_) => ErrorKind::NoCandidateMatched,
            AppError::ExtractionFailure(_) => ErrorKind::ExtractionFailure,
            AppError::ValidationFailure(_) => ErrorKind::ValidationFailure,
            AppError::VerificationRejected(_) => ErrorKind::VerificationRejected,
            AppError::QueryExecutionError(_) => ErrorKind::QueryExecutionError,
            AppError::ConnectionError(_) => ErrorKind::ConnectionError,
            AppError::Cancelled(_) => ErrorKind::Cancelled,
            AppError::LLMError(_)
            | AppError::ParseError(_)
            | AppError::IoError(_)
            | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Errors that abort the whole pipeline instead of advancing to the next candidate.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::ConnectionError(_) | AppError::Cancelled(_) | AppError::ConfigurationError(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ParseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
