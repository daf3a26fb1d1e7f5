use thiserror::Error;

/// Why a request URL was rejected before anything went on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// Malformed syntax
    ParseError,
    /// No host component
    MissingAuthority,
    /// No `http://` or `https://` prefix
    MissingScheme,
}

/// Transport-level failures.
///
/// `send()` only fails for these; non-2xx statuses surface through
/// [`HttpError::HttpStatus`] when the body is read with a checked reader.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// The request did not complete within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Decompressed body exceeded `max_body_size`
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Non-2xx status, with at most [`crate::ERROR_BODY_PREVIEW_LIMIT`] bytes of body
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
    },

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The request buffer is full
    #[error("Service overloaded: request buffer is full")]
    Overloaded,

    /// The buffer worker is gone
    #[error("Service unavailable: internal failure")]
    ServiceClosed,

    /// `reason` is diagnostic text only; match on `kind`.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },
}

impl HttpError {
    /// Status code of an [`HttpError::HttpStatus`], if that is what this is.
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            HttpError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct Refused;

    impl fmt::Display for Refused {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("connection refused")
        }
    }

    impl Error for Refused {}

    #[test]
    fn test_transport_error_keeps_source() {
        let err = HttpError::Transport(Box::new(Refused));
        let source = err.source().expect("transport error has a source");
        assert!(source.downcast_ref::<Refused>().is_some());
        assert_eq!(err.to_string(), "Transport error: connection refused");
    }

    #[test]
    fn test_status_accessor() {
        let err = HttpError::HttpStatus {
            status: http::StatusCode::NOT_FOUND,
            body_preview: String::new(),
            content_type: None,
        };
        assert_eq!(err.status(), Some(http::StatusCode::NOT_FOUND));
        assert_eq!(HttpError::Overloaded.status(), None);
    }
}
