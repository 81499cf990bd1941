//! Errors surfaced by the management facade and scheduler.

use strips_client::DownloadError;
use strips_core::model::{ComicId, RetrievalStatus};

#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    #[error("COMIC_NOT_FOUND: no comic with id {0}")]
    ComicNotFound(ComicId),

    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Core(#[from] strips_core::Error),

    #[error(transparent)]
    Download(#[from] DownloadError),
}

impl FacadeError {
    /// Retrieval classification for logging and records.
    pub fn status(&self) -> RetrievalStatus {
        match self {
            FacadeError::ComicNotFound(_) => RetrievalStatus::ComicUnavailable,
            FacadeError::InvalidInput(_) => RetrievalStatus::UnknownError,
            FacadeError::Core(e) => e.status(),
            FacadeError::Download(e) => e.status(),
        }
    }
}
