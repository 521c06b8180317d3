//! Error types for the networking module.

use thiserror::Error;

use crate::http::ContentType;

/// Failure to turn a response body into the object its content type promises.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The body bytes do not match the classified content type.
    #[error("malformed {content_type} body: {reason}")]
    Malformed {
        /// The classification the body was decoded against.
        content_type: ContentType,
        /// Description from the underlying parser.
        reason: String,
    },
}

impl DecodeError {
    pub(crate) fn malformed(content_type: ContentType, reason: impl ToString) -> Self {
        Self::Malformed {
            content_type,
            reason: reason.to_string(),
        }
    }

    /// The content type the body was classified as.
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Malformed { content_type, .. } => *content_type,
        }
    }
}

/// Network-specific errors.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    /// HTTP request failed for a reason not covered by a more specific variant.
    #[error("HTTP request error: {0}")]
    Request(String),
    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// The method token is not a known HTTP method.
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
    /// Request timed out.
    #[error("Request timed out")]
    Timeout,
    /// Connection refused or failed.
    #[error("Connection error: {0}")]
    Connection(String),
    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    Tls(String),
    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    /// Redirect limit exceeded.
    #[error("Too many redirects")]
    TooManyRedirects,
    /// The response arrived but its body could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Request was cancelled.
    #[error("Request was cancelled")]
    Cancelled,
    /// The background task driving the request was lost.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl NetworkError {
    /// Returns `true` for failures where no HTTP response was received.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Request(_)
                | Self::Timeout
                | Self::Connection(_)
                | Self::Tls(_)
                | Self::TooManyRedirects
        )
    }

    /// Returns the decode error, if this is one.
    pub fn as_decode(&self) -> Option<&DecodeError> {
        match self {
            Self::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            let message = err.to_string();
            if message.to_ascii_lowercase().contains("certificate")
                || message.to_ascii_lowercase().contains("tls")
            {
                Self::Tls(message)
            } else {
                Self::Connection(message)
            }
        } else if err.is_redirect() {
            Self::TooManyRedirects
        } else {
            Self::Request(err.to_string())
        }
    }
}

impl From<url::ParseError> for NetworkError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for NetworkError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for NetworkError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<tokio::task::JoinError> for NetworkError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Runtime(err.to_string())
        }
    }
}

/// A specialized Result type for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
