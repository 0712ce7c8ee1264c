//! Error types for crimestat-core

use thiserror::Error;

/// Main error type for the crimestat-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV reading error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing or invalid request parameters
    #[error("invalid parameters: {0}")]
    Validation(String),

    /// Unknown service or query name
    #[error("not recognized: {0}")]
    NotFound(String),

    /// Empty selection or too few points for a computation
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Freeform query rejected before execution
    #[error("query not authorized: {0}")]
    UnsafeQuery(String),

    /// Storage layer failure that is not a plain SQLite error
    #[error("storage error: {0}")]
    Storage(String),

    /// Another writer holds the store
    #[error("store is busy: {0}")]
    Busy(String),
}

/// User-facing failure categories.
///
/// Every [`Error`] maps onto exactly one of these; the service layer
/// uses the kind to pick the message shown to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientData,
    UnsafeQuery,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::UnsafeQuery => "unsafe_query",
            ErrorKind::Storage => "storage",
        }
    }
}

impl Error {
    /// Classify this error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Config(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InsufficientData(_) => ErrorKind::InsufficientData,
            Error::UnsafeQuery(_) => ErrorKind::UnsafeQuery,
            Error::Database(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Csv(_)
            | Error::Storage(_)
            | Error::Busy(_) => ErrorKind::Storage,
        }
    }

    /// Message safe to show to an end user.
    ///
    /// Storage failures are reduced to a generic sentence; the details go
    /// to the log instead.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(msg) | Error::Config(msg) => format!("Error: {msg}"),
            Error::NotFound(what) => format!("Service or query not recognized: {what}"),
            Error::InsufficientData(_) => crate::recommend::NO_DATA_MESSAGE.to_string(),
            Error::UnsafeQuery(_) => "Query not authorized".to_string(),
            _ => "The request could not be completed, please try again later".to_string(),
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Busy(_) => true,
            Error::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Result type alias for crimestat-core
pub type Result<T> = std::result::Result<T, Error>;
