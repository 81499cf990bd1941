//! Download failures and their retrieval classification.

use strips_core::model::RetrievalStatus;

/// Error raised while fetching a strip or profile from a source.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Connection, DNS or body read failure.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Request did not complete within the fetch timeout.
    #[error("NETWORK_ERROR: timed out: {0}")]
    Timeout(String),

    /// Source answered with a non-success status.
    #[error("HTTP_ERROR: status {status} for {url}")]
    Http { status: u16, url: String },

    /// Page did not contain what the scraper expects.
    #[error("PARSING_ERROR: {0}")]
    Parse(String),

    /// The source has no strip for the requested date.
    #[error("COMIC_UNAVAILABLE: {0}")]
    Unavailable(String),

    /// robots.txt forbids the request.
    #[error("ROBOTS_DISALLOWED: {0}")]
    RobotsDisallowed(String),

    /// A scraped URL resolves to a private or reserved address.
    #[error("SSRF_BLOCKED: {0}")]
    Blocked(String),

    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    #[error("FETCH_TOO_LARGE: {size} bytes exceeds {limit}")]
    TooLarge { size: usize, limit: usize },

    /// Headless rendering failed.
    #[error("RENDER_FAILED: {0}")]
    Render(String),

    /// No downloader is registered for the comic's source.
    #[error("UNKNOWN_SOURCE: {0}")]
    UnknownSource(String),

    /// A downloader is already registered for this source.
    #[error("DUPLICATE_SOURCE: {0}")]
    DuplicateSource(String),
}

impl DownloadError {
    /// Classify this failure into the retrieval taxonomy.
    pub fn status(&self) -> RetrievalStatus {
        match self {
            DownloadError::Network(_) | DownloadError::Timeout(_) => RetrievalStatus::NetworkError,
            DownloadError::Http { status, .. } => match status {
                401 | 403 => RetrievalStatus::AuthenticationError,
                404 | 410 => RetrievalStatus::ComicUnavailable,
                429 | 500..=599 => RetrievalStatus::NetworkError,
                _ => RetrievalStatus::ParsingError,
            },
            DownloadError::Parse(_) | DownloadError::InvalidUrl(_) | DownloadError::TooLarge { .. } => {
                RetrievalStatus::ParsingError
            }
            DownloadError::Unavailable(_) => RetrievalStatus::ComicUnavailable,
            DownloadError::RobotsDisallowed(_) | DownloadError::Blocked(_) => RetrievalStatus::AuthenticationError,
            DownloadError::Render(_) | DownloadError::UnknownSource(_) | DownloadError::DuplicateSource(_) => {
                RetrievalStatus::UnknownError
            }
        }
    }

    /// HTTP status behind this failure, if the source answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            DownloadError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DownloadError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            DownloadError::Http {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            DownloadError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> DownloadError {
        DownloadError::Http { status, url: "https://example.com/".into() }
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(http(404).status(), RetrievalStatus::ComicUnavailable);
        assert_eq!(http(410).status(), RetrievalStatus::ComicUnavailable);
        assert_eq!(http(403).status(), RetrievalStatus::AuthenticationError);
        assert_eq!(http(401).status(), RetrievalStatus::AuthenticationError);
        assert_eq!(http(503).status(), RetrievalStatus::NetworkError);
        assert_eq!(http(429).status(), RetrievalStatus::NetworkError);
        assert_eq!(http(418).status(), RetrievalStatus::ParsingError);
        assert_eq!(http(404).http_status(), Some(404));
    }

    #[test]
    fn test_local_classification() {
        assert_eq!(DownloadError::Timeout("x".into()).status(), RetrievalStatus::NetworkError);
        assert_eq!(DownloadError::Parse("no og:image".into()).status(), RetrievalStatus::ParsingError);
        assert_eq!(DownloadError::RobotsDisallowed("/".into()).status(), RetrievalStatus::AuthenticationError);
        assert_eq!(DownloadError::Blocked("10.0.0.1".into()).status(), RetrievalStatus::AuthenticationError);
        assert_eq!(DownloadError::Unavailable("moved".into()).status(), RetrievalStatus::ComicUnavailable);
        assert_eq!(DownloadError::UnknownSource("x".into()).status(), RetrievalStatus::UnknownError);
        assert_eq!(DownloadError::Network("x".into()).http_status(), None);
    }

    #[test]
    fn test_display_codes() {
        assert!(DownloadError::Parse("x".into()).to_string().starts_with("PARSING_ERROR"));
        assert!(DownloadError::Timeout("x".into()).to_string().starts_with("NETWORK_ERROR"));
    }
}
