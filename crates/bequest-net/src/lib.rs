//! Networking module for Bequest.
//!
//! This crate provides an HTTP client that:
//!
//! - **Builds requests** from a URL, method, headers and parameters
//! - **Runs them in the background**, reporting download progress
//! - **Decodes responses** by content type into JSON, images or raw bytes
//!
//! # Building requests
//!
//! ```ignore
//! use bequest_net::http::{build_request, Parameters};
//! use http::HeaderMap;
//!
//! let mut params = Parameters::new();
//! params.insert("q".to_string(), "rust".to_string());
//!
//! // GET/DELETE parameters go into the query string...
//! let get = build_request("https://example.com/search", "get", &HeaderMap::new(), &params)?;
//! assert_eq!(get.target(), "https://example.com/search?q=rust");
//!
//! // ...POST/PUT/PATCH parameters are form-encoded into the body.
//! let post = build_request("https://example.com/search", "POST", &HeaderMap::new(), &params)?;
//! assert_eq!(post.body().map(|b| b.as_ref()), Some(b"q=rust".as_ref()));
//! ```
//!
//! # Sending requests
//!
//! ```ignore
//! use std::sync::Arc;
//! use bequest_net::http::{AsyncHttpClient, DecodedObject, Parameters};
//! use http::HeaderMap;
//!
//! let client = AsyncHttpClient::new();
//!
//! client.request_with(
//!     "http://splinesoft.net/img/jhoviform.png",
//!     "GET",
//!     &HeaderMap::new(),
//!     &Parameters::new(),
//!     Some(Arc::new(|_request, progress| {
//!         println!("{} bytes", progress.bytes_transferred);
//!     })),
//!     |result| match result.outcome {
//!         Ok(decoded) => {
//!             if let DecodedObject::Image(image) = decoded.object {
//!                 println!("{}x{} image", image.width(), image.height());
//!             }
//!         }
//!         Err(err) => eprintln!("request failed: {err}"),
//!     },
//! )?;
//! ```
//!
//! # Configuration
//!
//! ```ignore
//! let client = HttpClient::builder()
//!     .timeout(Duration::from_secs(60))
//!     .user_agent("MyApp/1.0")
//!     .build()?;
//! ```

mod error;
pub mod http;

pub use error::{DecodeError, NetworkError, Result};

// Re-export commonly used types at the crate root
pub use self::http::{
    AsyncHttpClient, ContentType, DecodedObject, DecodedResponse, HttpClient, HttpClientBuilder,
    HttpMethod, ProgressEvent, RequestHandle, RequestSpec, TerminalResult, build_request,
};
