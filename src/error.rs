// src/error.rs

use crate::limits::LimitError;
use std::path::PathBuf;
use thiserror::Error;

/// Core error types for runepkg
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Secure allocation layer rejected a size, count, or path
    #[error(transparent)]
    Limit(#[from] LimitError),

    /// Package database could not be initialized
    #[error("Failed to initialize package database: {0}")]
    InitError(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Control file or metadata could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Archive could not be opened or unpacked
    #[error("Extraction failed: {0}")]
    ExtractionError(String),

    /// A package database entry exists but cannot be read back
    #[error("Corrupt package database entry {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// No installed package matches the given name
    #[error("Package not installed: {name}")]
    NotFound {
        name: String,
        suggestions: Vec<String>,
    },

    /// A bare name matches more than one installed package
    #[error("Multiple installed packages match '{name}': {}", .candidates.join(", "))]
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },

    /// Dependencies are missing or violate their constraints
    #[error("The following dependencies are not satisfied: {}", .0.join(", "))]
    UnsatisfiedDependencies(Vec<String>),

    /// Dependency recursion went deeper than the configured bound
    #[error("Dependency recursion limit of {0} exceeded")]
    RecursionLimit(usize),

    /// Index or database update failed after dependency resolution
    #[error("Failed to commit package metadata: {0}")]
    CommitError(String),

    /// Worker pool could not be created or a worker panicked
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Caller supplied an unusable argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Negative status code reported at the API boundary (success is 0)
    pub fn code(&self) -> i32 {
        match self {
            Error::Limit(e) => e.code(),
            Error::InvalidInput(_) => -5,
            Error::Io(_) => -7,
            Error::InitError(_) => -8,
            Error::ConfigError(_) => -9,
            Error::ParseError(_) => -10,
            Error::ExtractionError(_) => -11,
            Error::Corrupt { .. } => -12,
            Error::NotFound { .. } => -13,
            Error::Ambiguous { .. } => -14,
            Error::UnsatisfiedDependencies(_) => -15,
            Error::RecursionLimit(_) => -16,
            Error::CommitError(_) => -17,
            Error::WorkerPool(_) => -18,
        }
    }
}

/// Result type alias using runepkg's Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_negative() {
        let errors = vec![
            Error::InvalidInput("x".to_string()),
            Error::ConfigError("x".to_string()),
            Error::UnsatisfiedDependencies(vec!["libbar".to_string()]),
            Error::RecursionLimit(64),
            Error::Limit(LimitError::SizeLimit {
                what: "file count",
                actual: 2,
                limit: 1,
            }),
        ];
        for err in errors {
            assert!(err.code() < 0, "{} should map to a failure code", err);
        }
    }

    #[test]
    fn test_limit_code_passes_through() {
        let err: Error = LimitError::NullPointer("name").into();
        assert_eq!(err.code(), -1);
    }

    #[test]
    fn test_messages_list_every_item() {
        let err = Error::UnsatisfiedDependencies(vec![
            "libfoo (>= 3.0)".to_string(),
            "libbar".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("libfoo (>= 3.0)"));
        assert!(msg.contains("libbar"));

        let err = Error::Ambiguous {
            name: "pkg".to_string(),
            candidates: vec!["pkg-1.0".to_string(), "pkg-2.0".to_string()],
        };
        assert!(err.to_string().contains("pkg-1.0, pkg-2.0"));
    }
}
