use thiserror::Error;

/// Errors raised by the fund store and the bulk loader.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure, labelled with the operation that was running
    #[error("database error: {operation} - {reason}")]
    Database { operation: String, reason: String },

    /// Ticker is not present in `registered_fiis`
    #[error("fund not registered: {ticker}")]
    FundNotFound { ticker: String },

    /// Malformed input (CSV line, date string, number)
    #[error("parse error: {data_type} - {reason}")]
    Parsing { data_type: String, reason: String },

    #[error("I/O error: {operation} - {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("loader error: {message}")]
    Loader { message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn database(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn fund_not_found(ticker: impl Into<String>) -> Self {
        Self::FundNotFound {
            ticker: ticker.into(),
        }
    }

    pub fn parsing(data_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parsing {
            data_type: data_type.into(),
            reason: reason.into(),
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn loader(message: impl Into<String>) -> Self {
        Self::Loader {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        let operation = match &error {
            rusqlite::Error::SqliteFailure(_, _) => "SQL execution",
            rusqlite::Error::InvalidParameterName(_) => "parameter binding",
            rusqlite::Error::InvalidPath(_) => "path check",
            rusqlite::Error::InvalidColumnIndex(_) => "column index",
            rusqlite::Error::InvalidColumnName(_) => "column name",
            rusqlite::Error::InvalidColumnType(_, _, _) => "column type",
            rusqlite::Error::QueryReturnedNoRows => "query without rows",
            _ => "database operation",
        };

        StoreError::Database {
            operation: operation.to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        StoreError::Io {
            operation: "file I/O".to_string(),
            source: error,
        }
    }
}

impl From<chrono::ParseError> for StoreError {
    fn from(error: chrono::ParseError) -> Self {
        StoreError::parsing("date", error.to_string())
    }
}
