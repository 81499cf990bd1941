//! Unified error types for the strip engine.
//!
//! Every variant renders as `CODE: detail` so log lines and records stay
//! greppable. [`Error::status`] folds an error into the retrieval taxonomy.

use tokio_rusqlite::rusqlite;

use crate::model::RetrievalStatus;

/// Unified error type for core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty comic name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The requested comic or strip does not exist.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Archive directory or file operation failed.
    #[error("STORAGE_ERROR: {0}")]
    Storage(String),

    /// Image bytes failed validation or could not be decoded.
    #[error("INVALID_IMAGE: {0}")]
    InvalidImage(String),

    /// Catalog or bootstrap document could not be read or written.
    #[error("CATALOG_ERROR: {0}")]
    Catalog(String),

    /// State database operation failed.
    #[error("STATE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STATE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be decoded back into a domain type.
    #[error("STATE_ERROR: corrupt row: {0}")]
    CorruptRow(String),
}

impl Error {
    /// Classify this error into the retrieval failure taxonomy.
    pub fn status(&self) -> RetrievalStatus {
        match self {
            Error::Storage(_) | Error::Database(_) | Error::MigrationFailed(_) | Error::CorruptRow(_) => {
                RetrievalStatus::StorageError
            }
            Error::InvalidImage(_) => RetrievalStatus::ParsingError,
            Error::NotFound(_) => RetrievalStatus::ComicUnavailable,
            Error::InvalidInput(_) | Error::Catalog(_) => RetrievalStatus::UnknownError,
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Catalog(err.to_string())
    }
}
