//! Custom error types and handling
//!
//! This module defines the grader's error taxonomy. Configuration and
//! transfer errors abort the smallest enclosing unit of work (an assignment
//! or the whole run); everything raised while grading one submission is
//! converted into that submission's report by the orchestrator.

use crate::config::ConfigError;
use crate::grading::template::TemplateError;

/// Grader-wide error type
#[derive(Debug, thiserror::Error)]
pub enum GradeError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid directive on line {line}: {message}")]
    Descriptor { line: usize, message: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    // Transfer errors
    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Archive error: {0}")]
    Archive(String),

    // Execution errors
    #[error("Precommand failed: {0}")]
    Precommand(String),

    // Reporting errors
    #[error("Reporting error: {0}")]
    Reporting(String),

    // Infrastructure errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GradeError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Descriptor { .. } => "DESCRIPTOR_ERROR",
            Self::Template(_) => "TEMPLATE_ERROR",
            Self::Transfer(_) => "TRANSFER_ERROR",
            Self::Archive(_) => "ARCHIVE_ERROR",
            Self::Precommand(_) => "PRECOMMAND_ERROR",
            Self::Reporting(_) => "REPORTING_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error describes a broken grading setup rather than a
    /// problem with one submission.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Descriptor { .. } | Self::Template(_)
        )
    }
}

impl From<ConfigError> for GradeError {
    fn from(err: ConfigError) -> Self {
        GradeError::Configuration(err.to_string())
    }
}

impl From<zip::result::ZipError> for GradeError {
    fn from(err: zip::result::ZipError) -> Self {
        GradeError::Archive(err.to_string())
    }
}

impl From<tokio::task::JoinError> for GradeError {
    fn from(err: tokio::task::JoinError) -> Self {
        GradeError::Internal(anyhow::anyhow!("background task failed: {}", err))
    }
}

impl From<walkdir::Error> for GradeError {
    fn from(err: walkdir::Error) -> Self {
        GradeError::Io(std::io::Error::other(err.to_string()))
    }
}

/// Result type alias using GradeError
pub type GradeResult<T> = Result<T, GradeError>;
