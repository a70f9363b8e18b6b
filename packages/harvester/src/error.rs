//! Error types for the harvester.
//!
//! Uses the dual-error pattern: `HarvesterError` for library consumers
//! with detailed error context, and specific variants for the failure
//! modes callers need to tell apart (e.g. `PdfNotFound` is recorded as a
//! retrieval failure and never retried).

use thiserror::Error;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// HTTP request failed at transport level (connect, timeout, TLS, body).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-200 status.
    #[error("status {status} for {url}")]
    Status { url: String, status: u16 },

    /// A URL could not be parsed or joined against its base.
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// No PDF link could be found on an item page.
    #[error("no PDF link found on {0}")]
    PdfNotFound(String),

    /// The server kept answering with HTML where a PDF was expected.
    #[error("expected a PDF from {url}, got {content_type}")]
    UnexpectedContentType { url: String, content_type: String },

    /// Response body exceeded the configured maximum size.
    #[error("response from {url} exceeds {max_bytes} bytes")]
    ResponseTooLarge { url: String, max_bytes: u64 },

    /// Malformed input batch row or file.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl HarvesterError {
    /// Whether this error was raised at request level (transport or status).
    ///
    /// The query engine only surfaces request-level errors from the last
    /// endpoint it tried.
    #[must_use]
    pub fn is_request_level(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. })
    }
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        let err = HarvesterError::Status {
            url: "https://repo.example/discover".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "status 404 for https://repo.example/discover");
    }

    #[test]
    fn test_pdf_not_found_display() {
        let err = HarvesterError::PdfNotFound("https://repo.example/handle/1/1".to_string());
        assert_eq!(
            err.to_string(),
            "no PDF link found on https://repo.example/handle/1/1"
        );
    }

    #[test]
    fn test_request_level_classification() {
        let status = HarvesterError::Status {
            url: "u".to_string(),
            status: 500,
        };
        assert!(status.is_request_level());
        assert!(!HarvesterError::PdfNotFound("u".to_string()).is_request_level());
        assert!(!HarvesterError::InvalidInput("bad".to_string()).is_request_level());
    }
}
