//! HTTP request types and builder.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::client::HttpClient;
use super::response::{ProgressEvent, TerminalResult};
use crate::error::{NetworkError, Result};

/// Request parameters, keyed by name.
///
/// Ordered so that the encoded query string or body is deterministic.
pub type Parameters = BTreeMap<String, String>;

/// HTTP request methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// HTTP GET method.
    Get,
    /// HTTP POST method.
    Post,
    /// HTTP PUT method.
    Put,
    /// HTTP DELETE method.
    Delete,
    /// HTTP PATCH method.
    Patch,
    /// HTTP HEAD method.
    Head,
    /// HTTP OPTIONS method.
    Options,
}

impl HttpMethod {
    /// Convert to reqwest method.
    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch => reqwest::Method::PATCH,
            Self::Head => reqwest::Method::HEAD,
            Self::Options => reqwest::Method::OPTIONS,
        }
    }

    /// The canonical upper-case method token.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Whether parameters for this method travel in the request body rather
    /// than the query string.
    pub fn encodes_parameters_in_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl FromStr for HttpMethod {
    type Err = NetworkError;

    fn from_str(token: &str) -> Result<Self> {
        const ALL: [HttpMethod; 7] = [
            HttpMethod::Get,
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Delete,
            HttpMethod::Patch,
            HttpMethod::Head,
            HttpMethod::Options,
        ];

        let token = token.trim();
        ALL.into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| NetworkError::UnsupportedMethod(token.to_string()))
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How parameters are written into a body-bearing request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParameterEncoding {
    /// `application/x-www-form-urlencoded`.
    #[default]
    Form,
    /// A flat JSON object of string values.
    Json,
}

impl ParameterEncoding {
    fn content_type(self) -> &'static str {
        match self {
            Self::Form => "application/x-www-form-urlencoded",
            Self::Json => "application/json",
        }
    }

    fn encode(self, parameters: &Parameters) -> Bytes {
        match self {
            Self::Form => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(parameters)
                .finish()
                .into(),
            Self::Json => {
                let object: serde_json::Map<String, serde_json::Value> = parameters
                    .iter()
                    .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
                    .collect();
                serde_json::Value::Object(object).to_string().into()
            }
        }
    }
}

/// An immutable description of a request, ready to be sent.
///
/// Built once per call through [`build_request`] or [`HttpRequestBuilder`];
/// the target URL, encoded body and merged headers are all fixed at
/// construction time.
#[derive(Clone, Debug)]
pub struct RequestSpec {
    method: HttpMethod,
    url: String,
    headers: HeaderMap,
    parameters: Parameters,
    encoding: ParameterEncoding,
    target: String,
    body: Option<Bytes>,
    timeout: Option<Duration>,
}

impl RequestSpec {
    /// Build a request, encoding `parameters` according to `method`.
    ///
    /// Query-style methods append parameters to the URL; body-style methods
    /// encode them with `encoding` and gain `Content-Type`/`Content-Length`
    /// headers unless the caller already supplied them.
    pub fn new(
        url: &str,
        method: HttpMethod,
        headers: HeaderMap,
        parameters: Parameters,
        encoding: ParameterEncoding,
    ) -> Result<Self> {
        let mut parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NetworkError::InvalidUrl(format!(
                "unsupported scheme `{}` in {url}",
                parsed.scheme()
            )));
        }

        let mut headers = headers;
        let (target, body) = if parameters.is_empty() {
            (url.to_string(), None)
        } else if method.encodes_parameters_in_body() {
            let body = encoding.encode(&parameters);
            headers
                .entry(CONTENT_TYPE)
                .or_insert_with(|| HeaderValue::from_static(encoding.content_type()));
            headers
                .entry(CONTENT_LENGTH)
                .or_insert_with(|| HeaderValue::from(body.len()));
            (url.to_string(), Some(body))
        } else {
            parsed.query_pairs_mut().extend_pairs(&parameters);
            (parsed.to_string(), None)
        };

        Ok(Self {
            method,
            url: url.to_string(),
            headers,
            parameters,
            encoding,
            target,
            body,
            timeout: None,
        })
    }

    /// The HTTP method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// The URL as supplied by the caller.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The URL the request is sent to, including any query parameters.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Caller headers merged with protocol defaults.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The parameters the request was built from.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// The encoding applied to body parameters.
    pub fn encoding(&self) -> ParameterEncoding {
        self.encoding
    }

    /// The encoded body, if the request carries one.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Timeout override for this request.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Return a copy of this request with a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Build a request from its parts.
///
/// The method token is matched case-insensitively; unknown tokens fail with
/// [`NetworkError::UnsupportedMethod`] before anything touches the network.
/// With no parameters the target URL is byte-identical to `url`.
///
/// ```ignore
/// let request = build_request("https://httpbin.org/post", "post", &HeaderMap::new(), &Parameters::new())?;
/// assert_eq!(request.method().as_str(), "POST");
/// ```
pub fn build_request(
    url: &str,
    method: &str,
    headers: &HeaderMap,
    parameters: &Parameters,
) -> Result<RequestSpec> {
    let method: HttpMethod = method.parse()?;
    RequestSpec::new(
        url,
        method,
        headers.clone(),
        parameters.clone(),
        ParameterEncoding::default(),
    )
}

/// Convert string pairs into a [`HeaderMap`].
pub fn header_map<I, K, V>(pairs: I) -> Result<HeaderMap>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_ref().as_bytes())?;
        let value = HeaderValue::from_str(value.as_ref())?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Convert a single name/value pair, keeping the parser's reason on failure.
pub(crate) fn header_pair<K, V>(name: K, value: V) -> Result<(HeaderName, HeaderValue)>
where
    HeaderName: TryFrom<K>,
    <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
    HeaderValue: TryFrom<V>,
    <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
{
    let invalid = |err: http::Error| NetworkError::InvalidHeader(err.to_string());
    let name = HeaderName::try_from(name).map_err(|err| invalid(err.into()))?;
    let value = HeaderValue::try_from(value).map_err(|err| invalid(err.into()))?;
    Ok((name, value))
}

/// Builder for constructing HTTP requests.
pub struct HttpRequestBuilder {
    client: HttpClient,
    method: HttpMethod,
    url: String,
    headers: HeaderMap,
    parameters: Parameters,
    encoding: ParameterEncoding,
    timeout: Option<Duration>,
    error: Option<NetworkError>,
}

impl HttpRequestBuilder {
    /// Create a new request builder.
    pub(crate) fn new(client: HttpClient, method: HttpMethod, url: String) -> Self {
        Self {
            client,
            method,
            url,
            headers: HeaderMap::new(),
            parameters: Parameters::new(),
            encoding: ParameterEncoding::default(),
            timeout: None,
            error: None,
        }
    }

    /// Add a header to the request.
    ///
    /// An invalid name or value is reported when the request is built.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        match header_pair(name, value) {
            Ok((name, value)) => {
                self.headers.insert(name, value);
            }
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
        self
    }

    /// Add multiple headers to the request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Add a parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Add multiple parameters.
    pub fn params<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.parameters
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Choose how body parameters are encoded.
    pub fn encoding(mut self, encoding: ParameterEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set a timeout for this specific request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the request without sending it.
    pub fn build(self) -> Result<RequestSpec> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let request = RequestSpec::new(
            &self.url,
            self.method,
            self.headers,
            self.parameters,
            self.encoding,
        )?;
        Ok(match self.timeout {
            Some(timeout) => request.with_timeout(timeout),
            None => request,
        })
    }

    /// Send the request and wait for its terminal result.
    ///
    /// Construction errors are returned directly; everything after dispatch,
    /// including transport and decode failures, is carried by the
    /// [`TerminalResult`].
    pub async fn send(self) -> Result<TerminalResult> {
        self.send_with_progress(|_| {}).await
    }

    /// Like [`send`](Self::send), reporting body progress to `on_progress`.
    pub async fn send_with_progress<F>(self, on_progress: F) -> Result<TerminalResult>
    where
        F: FnMut(&ProgressEvent) + Send,
    {
        let client = self.client.clone();
        let request = Arc::new(self.build()?);
        Ok(client.execute(request, on_progress).await)
    }
}

impl std::fmt::Debug for HttpRequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequestBuilder")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("parameters", &self.parameters.len())
            .finish()
    }
}
