//! HTTP client implementation.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::ACCEPT;
use http::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;

use super::classify::{ContentType, SNIFF_LEN, classify};
use super::decode::{DecodedObject, decode};
use super::request::{HttpMethod, HttpRequestBuilder, RequestSpec, header_pair};
use super::response::{
    DecodedResponse, ProgressEvent, ResponseBody, ResponseMetadata, TerminalResult,
};
use crate::error::Result;

/// Upper bound on the body buffer reserved up front from `Content-Length`.
const MAX_PREALLOCATION: usize = 8 * 1024 * 1024;

/// Configuration for the HTTP client.
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Whether to follow redirects.
    pub follow_redirects: bool,
    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
    /// Default user agent.
    pub user_agent: Option<String>,
    /// How long idle pooled connections are kept alive.
    pub pool_idle_timeout: Option<Duration>,
    /// Headers sent with every request unless the request sets them itself.
    pub default_headers: HeaderMap,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, image/png, image/jpeg, image/gif, */*;q=0.5"),
        );

        Self {
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(10)),
            follow_redirects: true,
            max_redirects: 10,
            user_agent: Some(format!("Bequest/{} (Rust)", env!("CARGO_PKG_VERSION"))),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            default_headers,
        }
    }
}

/// Builder for creating an HTTP client with custom configuration.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: HttpClientConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self { config }
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Disable request timeout.
    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = None;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Disable redirect following.
    pub fn no_redirects(mut self) -> Self {
        self.config.follow_redirects = false;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Set how long idle pooled connections are kept.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = Some(timeout);
        self
    }

    /// Add a default header that will be sent with every request.
    pub fn default_header<K, V>(mut self, name: K, value: V) -> Result<Self>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let (name, value) = header_pair(name, value)?;
        self.config.default_headers.insert(name, value);
        Ok(self)
    }

    /// Remove all default headers, including the default `Accept`.
    pub fn clear_default_headers(mut self) -> Self {
        self.config.default_headers.clear();
        self
    }

    /// Build the HTTP client.
    pub fn build(self) -> Result<HttpClient> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        if self.config.follow_redirects {
            builder = builder.redirect(Policy::limited(self.config.max_redirects));
        } else {
            builder = builder.redirect(Policy::none());
        }

        if let Some(ref ua) = self.config.user_agent {
            builder = builder.user_agent(ua);
        }

        builder = builder
            .pool_idle_timeout(self.config.pool_idle_timeout)
            .default_headers(self.config.default_headers.clone());

        let client = builder.build()?;

        Ok(HttpClient {
            inner: Arc::new(HttpClientInner {
                client,
                config: self.config,
            }),
        })
    }
}

/// Internal state for the HTTP client.
struct HttpClientInner {
    client: reqwest::Client,
    config: HttpClientConfig,
}

/// An HTTP client that sends requests and decodes their responses.
///
/// The client is cheaply cloneable and thread-safe. Clones share the same
/// underlying connection pool and configuration, so any number of requests
/// may be in flight at once.
///
/// # Example
///
/// ```ignore
/// use bequest_net::http::HttpClient;
///
/// let client = HttpClient::new();
/// let result = client.get("https://httpbin.org/get").send().await?;
/// println!("Status: {:?}", result.status());
/// ```
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<HttpClientInner>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialised. Use
    /// [`HttpClient::builder`] to handle that case.
    pub fn new() -> Self {
        HttpClientBuilder::new()
            .build()
            .expect("Failed to create HTTP client with default configuration")
    }

    /// Create a builder for configuring a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Get the client's configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.inner.config
    }

    /// Create a GET request builder.
    pub fn get(&self, url: impl AsRef<str>) -> HttpRequestBuilder {
        self.request(HttpMethod::Get, url)
    }

    /// Create a POST request builder.
    pub fn post(&self, url: impl AsRef<str>) -> HttpRequestBuilder {
        self.request(HttpMethod::Post, url)
    }

    /// Create a PUT request builder.
    pub fn put(&self, url: impl AsRef<str>) -> HttpRequestBuilder {
        self.request(HttpMethod::Put, url)
    }

    /// Create a DELETE request builder.
    pub fn delete(&self, url: impl AsRef<str>) -> HttpRequestBuilder {
        self.request(HttpMethod::Delete, url)
    }

    /// Create a PATCH request builder.
    pub fn patch(&self, url: impl AsRef<str>) -> HttpRequestBuilder {
        self.request(HttpMethod::Patch, url)
    }

    /// Create a HEAD request builder.
    pub fn head(&self, url: impl AsRef<str>) -> HttpRequestBuilder {
        self.request(HttpMethod::Head, url)
    }

    /// Create a request builder with a custom method.
    pub fn request(&self, method: HttpMethod, url: impl AsRef<str>) -> HttpRequestBuilder {
        HttpRequestBuilder::new(self.clone(), method, url.as_ref().to_string())
    }

    /// Send a prebuilt request without progress reporting.
    pub async fn send(&self, request: RequestSpec) -> TerminalResult {
        self.execute(Arc::new(request), |_| {}).await
    }

    /// Send `request`, stream its body and decode it.
    ///
    /// `on_progress` is called after every received chunk, always before this
    /// future resolves. Every failure, whether transport or decode, ends up in
    /// the returned [`TerminalResult`]; nothing is retried.
    pub async fn execute<F>(&self, request: Arc<RequestSpec>, mut on_progress: F) -> TerminalResult
    where
        F: FnMut(&ProgressEvent) + Send,
    {
        tracing::debug!(
            target: "bequest_net::http",
            method = %request.method(),
            url = request.target(),
            "dispatching request"
        );

        let response = match self.dispatch(&request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(target: "bequest_net::http", url = request.target(), "request failed: {}", err);
                return TerminalResult::failed(request, err);
            }
        };

        let metadata = ResponseMetadata::from_reqwest(&response);
        let capacity = metadata
            .content_length
            .map_or(0, |len| usize::try_from(len).unwrap_or(usize::MAX).min(MAX_PREALLOCATION));
        let mut buffer = Vec::with_capacity(capacity);
        let mut body = ResponseBody::new(response);

        loop {
            match body.next_chunk().await {
                Ok(Some(chunk)) => {
                    buffer.extend_from_slice(&chunk);
                    let progress = body.progress();
                    tracing::trace!(
                        target: "bequest_net::http",
                        received = progress.bytes_transferred,
                        total = ?progress.total_bytes,
                        "body chunk"
                    );
                    on_progress(&progress);
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(target: "bequest_net::http", url = request.target(), "body transfer failed: {}", err);
                    return TerminalResult::failed(request, err);
                }
            }
        }

        let outcome = decode_body(
            request.method(),
            metadata.status,
            &metadata.headers,
            Bytes::from(buffer),
        )
        .await;
        match &outcome {
            Ok(decoded) => tracing::debug!(
                target: "bequest_net::http",
                status = metadata.status,
                content_type = %decoded.content_type,
                "request finished"
            ),
            Err(err) => tracing::warn!(
                target: "bequest_net::http",
                status = metadata.status,
                "response body could not be decoded: {}",
                err
            ),
        }
        TerminalResult::completed(request, metadata, outcome)
    }

    async fn dispatch(&self, request: &RequestSpec) -> Result<reqwest::Response> {
        let mut req_builder = self
            .reqwest_client()
            .request(request.method().to_reqwest(), request.target())
            .headers(request.headers().clone());

        if let Some(timeout) = request.timeout() {
            req_builder = req_builder.timeout(timeout);
        }
        if let Some(body) = request.body() {
            req_builder = req_builder.body(body.clone());
        }

        Ok(req_builder.send().await?)
    }

    /// Get a reference to the underlying reqwest client.
    pub(crate) fn reqwest_client(&self) -> &reqwest::Client {
        &self.inner.client
    }
}

/// Whether a response to `method` with `status` carries no body by definition.
fn is_bodiless(method: HttpMethod, status: u16) -> bool {
    method == HttpMethod::Head || (100..200).contains(&status) || status == 204 || status == 304
}

/// Classify and decode a complete body off the async worker threads.
///
/// Bodiless responses skip classification and come back as empty raw bytes,
/// whatever their `Content-Type` says.
async fn decode_body(
    method: HttpMethod,
    status: u16,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<DecodedResponse> {
    if body.is_empty() && is_bodiless(method, status) {
        return Ok(DecodedResponse {
            content_type: ContentType::Raw,
            status,
            object: DecodedObject::Bytes(body),
        });
    }

    let content_type = classify(headers, &body[..body.len().min(SNIFF_LEN)]);
    let object = tokio::task::spawn_blocking(move || decode(content_type, &body)).await??;
    Ok(DecodedResponse {
        content_type,
        status,
        object,
    })
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.inner.config)
            .finish()
    }
}
