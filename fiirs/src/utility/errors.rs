use thiserror::Error;

use crate::model::Algorithm;

/// Every failure the classification pipeline can report.
#[derive(Error, Debug)]
pub enum FiirsError {
    /// Failure inside the data collaborator
    #[error("database error: {operation} - {reason}")]
    Database { operation: String, reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] crate::utility::config::ConfigError),

    /// Algorithm name that maps to no classifier family
    #[error("unsupported algorithm: '{name}' (expected one of {expected})")]
    InvalidAlgorithm { name: String, expected: String },

    /// Validation vectors narrower than the training vectors. Fatal.
    #[error(
        "validation feature width {validation_width} is smaller than training width {training_width}; \
         widen the validation window"
    )]
    WidthMismatch {
        validation_width: usize,
        training_width: usize,
    },

    #[error("insufficient data: {operation} - {reason}")]
    InsufficientData { operation: String, reason: String },

    #[error("validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("I/O error: {operation} - {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error: {message}")]
    General { message: String },
}

pub type FiirsResult<T> = Result<T, FiirsError>;

impl FiirsError {
    pub fn database(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_algorithm(name: impl Into<String>) -> Self {
        let expected = Algorithm::ALL
            .iter()
            .map(|a| a.name())
            .collect::<Vec<_>>()
            .join(", ");
        Self::InvalidAlgorithm {
            name: name.into(),
            expected,
        }
    }

    pub fn width_mismatch(validation_width: usize, training_width: usize) -> Self {
        Self::WidthMismatch {
            validation_width,
            training_width,
        }
    }

    pub fn insufficient_data(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::General {
            message: message.into(),
        }
    }
}

impl From<fiistore::StoreError> for FiirsError {
    fn from(error: fiistore::StoreError) -> Self {
        let operation = match &error {
            fiistore::StoreError::Database { operation, .. } => operation.clone(),
            fiistore::StoreError::FundNotFound { .. } => "fund lookup".to_string(),
            fiistore::StoreError::Parsing { .. } => "stored data parsing".to_string(),
            fiistore::StoreError::Io { .. } => "store I/O".to_string(),
            fiistore::StoreError::Loader { .. } => "bulk load".to_string(),
        };
        FiirsError::Database {
            operation,
            reason: error.to_string(),
        }
    }
}

impl From<std::io::Error> for FiirsError {
    fn from(error: std::io::Error) -> Self {
        FiirsError::Io {
            operation: "file I/O".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for FiirsError {
    fn from(error: serde_json::Error) -> Self {
        FiirsError::General {
            message: format!("JSON serialization failed: {}", error),
        }
    }
}
