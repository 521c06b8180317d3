//! HTTP client for Bequest.
//!
//! This module builds requests, runs them in the background with progress
//! reporting, and decodes each response according to its content type.
//!
//! # Example
//!
//! ```ignore
//! use bequest_net::http::{HttpClient, ContentType};
//!
//! let client = HttpClient::new();
//!
//! // Build and send a GET request, waiting for the decoded result
//! let result = client.get("http://echo.jsontest.com/key/value").send().await?;
//! if let Some(decoded) = result.decoded() {
//!     assert_eq!(decoded.content_type, ContentType::Json);
//! }
//! ```
//!
//! # Background requests
//!
//! `AsyncHttpClient` returns immediately and reports through callbacks:
//!
//! ```ignore
//! use bequest_net::http::AsyncHttpClient;
//!
//! let client = AsyncHttpClient::new();
//! let handle = client.request("http://httpbin.org/get", |result| {
//!     println!("status: {:?}", result.status());
//! })?;
//!
//! // Cancel if needed
//! handle.cancel();
//! ```

mod async_client;
mod classify;
mod client;
mod decode;
mod request;
mod response;

pub use async_client::{
    AsyncHttpClient, ProgressSink, RequestEvent, RequestEvents, RequestHandle, RequestId, runtime,
};
pub use classify::{ContentType, SNIFF_LEN, classify};
pub use client::{HttpClient, HttpClientBuilder, HttpClientConfig};
pub use decode::{DecodedImage, DecodedObject, decode};
pub use request::{
    HttpMethod, HttpRequestBuilder, ParameterEncoding, Parameters, RequestSpec, build_request,
    header_map,
};
pub use response::{DecodedResponse, ProgressEvent, ResponseMetadata, TerminalResult};
