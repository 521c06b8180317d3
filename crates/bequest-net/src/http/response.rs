//! HTTP response types.

use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;

use super::classify::ContentType;
use super::decode::DecodedObject;
use super::request::RequestSpec;
use crate::error::{NetworkError, Result};

/// Status line and headers of a response that reached the client.
#[derive(Clone, Debug)]
pub struct ResponseMetadata {
    /// The HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// The final URL after redirects.
    pub url: String,
    /// The `Content-Length` of the body, if declared.
    pub content_length: Option<u64>,
}

impl ResponseMetadata {
    /// Capture metadata from a reqwest response.
    pub(crate) fn from_reqwest(response: &reqwest::Response) -> Self {
        Self {
            status: response.status().as_u16(),
            headers: response.headers().clone(),
            url: response.url().to_string(),
            content_length: response.content_length(),
        }
    }

    /// Check if the response indicates success (2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if the response is a client error (4xx status).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if the response is a server error (5xx status).
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the Content-Type header value.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// A streaming response body with progress tracking.
pub(crate) struct ResponseBody {
    inner: reqwest::Response,
    total_size: Option<u64>,
    bytes_received: u64,
}

impl ResponseBody {
    pub(crate) fn new(response: reqwest::Response) -> Self {
        let total_size = response.content_length();
        Self {
            inner: response,
            total_size,
            bytes_received: 0,
        }
    }

    /// Progress of the body transfer so far.
    pub(crate) fn progress(&self) -> ProgressEvent {
        ProgressEvent {
            bytes_transferred: self.bytes_received,
            total_bytes: self.total_size,
        }
    }

    /// Read the next chunk of data.
    ///
    /// Returns `None` when the stream is complete.
    pub(crate) async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.inner.chunk().await? {
            Some(chunk) => {
                self.bytes_received += chunk.len() as u64;
                Ok(Some(chunk))
            }
            None => Ok(None),
        }
    }
}

/// Progress of a response body transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Number of bytes transferred so far.
    pub bytes_transferred: u64,
    /// Total number of bytes, if known.
    pub total_bytes: Option<u64>,
}

impl ProgressEvent {
    /// Get the progress as a fraction (0.0 to 1.0), if total is known.
    pub fn fraction(&self) -> Option<f64> {
        self.total_bytes.map(|total| {
            if total == 0 {
                1.0
            } else {
                self.bytes_transferred as f64 / total as f64
            }
        })
    }

    /// Get the progress as a percentage (0 to 100), if total is known.
    pub fn percent(&self) -> Option<u8> {
        self.fraction().map(|f| (f * 100.0).min(100.0) as u8)
    }
}

/// A successfully decoded response body together with its classification.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedResponse {
    /// How the body was classified.
    pub content_type: ContentType,
    /// The HTTP status code the body arrived with.
    pub status: u16,
    /// The decoded body.
    pub object: DecodedObject,
}

/// The single final outcome of a request.
///
/// `response` is present whenever an HTTP response was received, even if its
/// body failed to decode. It is absent for transport failures and
/// cancellation.
#[derive(Clone, Debug)]
pub struct TerminalResult {
    /// The request this result belongs to.
    pub request: Arc<RequestSpec>,
    /// Status and headers, when the server was reached.
    pub response: Option<ResponseMetadata>,
    /// The decoded body, or the reason there is none.
    pub outcome: Result<DecodedResponse>,
}

impl TerminalResult {
    pub(crate) fn completed(
        request: Arc<RequestSpec>,
        response: ResponseMetadata,
        outcome: Result<DecodedResponse>,
    ) -> Self {
        Self {
            request,
            response: Some(response),
            outcome,
        }
    }

    pub(crate) fn failed(request: Arc<RequestSpec>, error: NetworkError) -> Self {
        Self {
            request,
            response: None,
            outcome: Err(error),
        }
    }

    /// The HTTP status code, if a response was received.
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    /// The decoded body, if decoding succeeded.
    pub fn decoded(&self) -> Option<&DecodedResponse> {
        self.outcome.as_ref().ok()
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&NetworkError> {
        self.outcome.as_ref().err()
    }

    /// Returns `true` for a 2xx response whose body decoded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok() && self.response.as_ref().is_some_and(ResponseMetadata::is_success)
    }

    /// Returns `true` if the request was cancelled before completing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, Err(NetworkError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    #[test]
    fn test_progress_fraction() {
        let progress = ProgressEvent {
            bytes_transferred: 250,
            total_bytes: Some(1000),
        };
        assert_eq!(progress.fraction(), Some(0.25));
        assert_eq!(progress.percent(), Some(25));

        let unknown = ProgressEvent {
            bytes_transferred: 10,
            total_bytes: None,
        };
        assert_eq!(unknown.fraction(), None);

        let empty = ProgressEvent {
            bytes_transferred: 0,
            total_bytes: Some(0),
        };
        assert_eq!(empty.percent(), Some(100));
    }

    #[test]
    fn test_failed_result_has_no_response() {
        let request = Arc::new(
            RequestSpec::new(
                "https://example.com",
                HttpMethod::Get,
                HeaderMap::new(),
                Default::default(),
                Default::default(),
            )
            .unwrap(),
        );
        let result = TerminalResult::failed(request, NetworkError::Timeout);
        assert!(result.response.is_none());
        assert!(result.decoded().is_none());
        assert!(matches!(result.error(), Some(NetworkError::Timeout)));
        assert!(!result.is_success());
        assert_eq!(result.status(), None);
    }
}
