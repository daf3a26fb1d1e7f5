use http::StatusCode;
use odata_edm::EdmError;
use odata_http::HttpError;
use thiserror::Error;

/// Everything an adapter operation can fail with.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConnectorError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Schema(#[from] EdmError),

    /// Rejected before any request was issued
    #[error("invalid query options: {0}")]
    Validation(String),

    /// A non-2xx response, or a 2xx one whose body carries an `error` object
    #[error("OData service error ({status}): {message}")]
    Service { status: StatusCode, message: String },

    #[error("failed to fetch $metadata from {url}: {source}")]
    Metadata {
        url: String,
        #[source]
        source: Box<ConnectorError>,
    },

    #[error("model '{0}' is not registered")]
    UnknownModel(String),

    #[error("endpoint '{0}' is not registered")]
    UnknownEndpoint(String),

    /// A model-level rule (key immutability, singleton restrictions)
    #[error("{0}")]
    Rejected(String),

    #[error("unexpected response payload: {0}")]
    Payload(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ConnectorError {
    /// Whether the service answered 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Service { status, .. } => *status == StatusCode::NOT_FOUND,
            Self::Http(err) => err.status() == Some(StatusCode::NOT_FOUND),
            _ => false,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Service { status, .. } => Some(*status),
            Self::Http(err) => err.status(),
            Self::Metadata { source, .. } => source.status(),
            _ => None,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<figment::Error> for ConnectorError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
