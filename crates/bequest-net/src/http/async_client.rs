//! Fire-and-forget HTTP requests with callback or channel completion.
//!
//! [`AsyncHttpClient`] submits each request as its own task and returns a
//! [`RequestHandle`] straight away. Progress and the terminal result are
//! delivered either to closures or over a per-request [`RequestEvents`]
//! channel. For one request, every progress notification precedes the single
//! terminal notification and nothing follows it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use http::HeaderMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use super::client::HttpClient;
use super::request::{HttpMethod, Parameters, RequestSpec, build_request};
use super::response::{ProgressEvent, TerminalResult};
use crate::error::{NetworkError, Result};

/// Receives progress for a request: the originating request and the latest
/// transfer totals.
pub type ProgressSink = Arc<dyn Fn(&RequestSpec, &ProgressEvent) + Send + Sync>;

/// Unique identifier for an async request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A handle to a pending HTTP request that can be cancelled.
pub struct RequestHandle {
    /// The unique ID of this request.
    pub id: RequestId,
    cancel_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl RequestHandle {
    /// Cancel the pending request.
    ///
    /// Once cancelled, no further progress is reported and the terminal
    /// result carries [`NetworkError::Cancelled`]. Returns `true` if the
    /// cancellation signal was sent, `false` if the request has already
    /// completed or was already cancelled.
    pub fn cancel(&self) -> bool {
        if let Some(tx) = self.cancel_tx.lock().take() {
            tx.send(()).is_ok()
        } else {
            false
        }
    }

    /// Check if the request is still pending.
    pub fn is_pending(&self) -> bool {
        self.cancel_tx.lock().is_some()
    }
}

impl Clone for RequestHandle {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cancel_tx: self.cancel_tx.clone(),
        }
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// A notification delivered over [`RequestEvents`].
#[derive(Clone, Debug)]
pub enum RequestEvent {
    /// More of the response body has arrived.
    Progress(ProgressEvent),
    /// The request is over. Always the last event.
    Finished(TerminalResult),
}

/// The receiving side of a request submitted with
/// [`AsyncHttpClient::request_events`].
#[derive(Debug)]
pub struct RequestEvents {
    rx: mpsc::UnboundedReceiver<RequestEvent>,
}

impl RequestEvents {
    /// Wait for the next event. Returns `None` after the terminal event.
    pub async fn recv(&mut self) -> Option<RequestEvent> {
        self.rx.recv().await
    }

    /// Skip progress and wait for the terminal result.
    pub async fn finished(mut self) -> Option<TerminalResult> {
        while let Some(event) = self.rx.recv().await {
            if let RequestEvent::Finished(result) = event {
                return Some(result);
            }
        }
        None
    }
}

/// Owns a request's completion callback until it has been called.
///
/// If the task driving the request is dropped first, for instance because its
/// runtime shut down, the callback still runs with [`NetworkError::Runtime`].
struct Completion<C>
where
    C: FnOnce(TerminalResult),
{
    request: Arc<RequestSpec>,
    cancel_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    callback: Option<C>,
}

impl<C> Completion<C>
where
    C: FnOnce(TerminalResult),
{
    fn deliver(mut self, result: TerminalResult) {
        self.finish(result);
    }

    fn finish(&mut self, result: TerminalResult) {
        // Mark handle as completed
        self.cancel_tx.lock().take();
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl<C> Drop for Completion<C>
where
    C: FnOnce(TerminalResult),
{
    fn drop(&mut self) {
        if self.callback.is_some() {
            tracing::warn!(
                target: "bequest_net::http",
                url = self.request.target(),
                "request task dropped before completing"
            );
            let result = TerminalResult::failed(
                Arc::clone(&self.request),
                NetworkError::Runtime("request task was dropped before completing".to_string()),
            );
            self.finish(result);
        }
    }
}

/// An HTTP client whose requests run in the background.
///
/// Every `request*` call returns immediately; the transfer runs as a task on
/// the tokio runtime the call was made from, or on the crate's shared
/// [`runtime`] when there is none. Requests share the underlying connection
/// pool and are never serialised against each other.
///
/// # Example
///
/// ```ignore
/// use bequest_net::http::AsyncHttpClient;
///
/// let client = AsyncHttpClient::new();
/// client.request("http://httpbin.org/get", |result| {
///     println!("finished with {:?}", result.status());
/// })?;
/// ```
pub struct AsyncHttpClient {
    client: HttpClient,
}

impl Default for AsyncHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncHttpClient {
    /// Create a new async HTTP client with default configuration.
    pub fn new() -> Self {
        Self::from_client(HttpClient::new())
    }

    /// Create from an existing HTTP client.
    pub fn from_client(client: HttpClient) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying HTTP client.
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Start a GET request with no headers, parameters or progress sink.
    pub fn request<C>(&self, url: &str, completion: C) -> Result<RequestHandle>
    where
        C: FnOnce(TerminalResult) + Send + 'static,
    {
        self.request_with(
            url,
            HttpMethod::Get.as_str(),
            &HeaderMap::new(),
            &Parameters::new(),
            None,
            completion,
        )
    }

    /// Start a request from its parts.
    ///
    /// An unknown method or malformed URL is reported here, synchronously,
    /// and nothing is sent. Everything after that arrives through
    /// `completion`, which is called exactly once.
    pub fn request_with<C>(
        &self,
        url: &str,
        method: &str,
        headers: &HeaderMap,
        parameters: &Parameters,
        progress: Option<ProgressSink>,
        completion: C,
    ) -> Result<RequestHandle>
    where
        C: FnOnce(TerminalResult) + Send + 'static,
    {
        let request = build_request(url, method, headers, parameters)?;
        Ok(self.send_async(request, progress, completion))
    }

    /// Submit a prebuilt request.
    pub fn send_async<C>(
        &self,
        request: RequestSpec,
        progress: Option<ProgressSink>,
        completion: C,
    ) -> RequestHandle
    where
        C: FnOnce(TerminalResult) + Send + 'static,
    {
        let request_id = RequestId::new();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let handle = RequestHandle {
            id: request_id,
            cancel_tx: Arc::new(Mutex::new(Some(cancel_tx))),
        };

        let client = self.client.clone();
        let request = Arc::new(request);
        let completion = Completion {
            request: Arc::clone(&request),
            cancel_tx: Arc::clone(&handle.cancel_tx),
            callback: Some(completion),
        };

        let runtime = Handle::try_current().unwrap_or_else(|_| runtime::get().handle().clone());
        runtime.spawn(async move {
            let on_progress = |event: &ProgressEvent| {
                if let Some(sink) = &progress {
                    sink(&request, event);
                }
            };

            let finished = tokio::select! {
                biased;
                _ = cancel_rx => None,
                result = client.execute(Arc::clone(&request), on_progress) => Some(result),
            };

            let result = finished.unwrap_or_else(|| {
                tracing::debug!(target: "bequest_net::http", id = ?request_id, "request cancelled");
                TerminalResult::failed(Arc::clone(&request), NetworkError::Cancelled)
            });
            completion.deliver(result);
        });

        handle
    }

    /// Submit a prebuilt request and receive its events over a channel.
    ///
    /// The channel yields zero or more [`RequestEvent::Progress`] values,
    /// then exactly one [`RequestEvent::Finished`], then closes.
    pub fn request_events(&self, request: RequestSpec) -> (RequestHandle, RequestEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let progress_tx = tx.clone();
        let sink: ProgressSink = Arc::new(move |_: &RequestSpec, event: &ProgressEvent| {
            let _ = progress_tx.send(RequestEvent::Progress(*event));
        });
        let handle = self.send_async(request, Some(sink), move |result| {
            let _ = tx.send(RequestEvent::Finished(result));
        });
        (handle, RequestEvents { rx })
    }
}

impl std::fmt::Debug for AsyncHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncHttpClient")
            .field("client", &self.client)
            .finish()
    }
}

/// The shared runtime used when a request is started outside any tokio
/// runtime.
pub mod runtime {
    use std::sync::OnceLock;
    use tokio::runtime::Runtime;

    static RUNTIME: OnceLock<Runtime> = OnceLock::new();

    /// Get the shared runtime, creating it on first use.
    pub fn get() -> &'static Runtime {
        RUNTIME.get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .thread_name("bequest-net")
                .enable_all()
                .build()
                .expect("Failed to create tokio runtime")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion_for<C>(callback: C) -> (RequestHandle, Completion<C>)
    where
        C: FnOnce(TerminalResult),
    {
        let request = Arc::new(
            build_request("https://example.com", "GET", &HeaderMap::new(), &Parameters::new())
                .unwrap(),
        );
        let (cancel_tx, _cancel_rx) = oneshot::channel();
        let handle = RequestHandle {
            id: RequestId::new(),
            cancel_tx: Arc::new(Mutex::new(Some(cancel_tx))),
        };
        let completion = Completion {
            request,
            cancel_tx: Arc::clone(&handle.cancel_tx),
            callback: Some(callback),
        };
        (handle, completion)
    }

    #[test]
    fn test_dropped_completion_reports_runtime_error() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let (handle, completion) = completion_for(move |result: TerminalResult| {
            sink.lock().push(result);
        });

        drop(completion);

        let delivered = delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert!(matches!(delivered[0].error(), Some(NetworkError::Runtime(_))));
        assert!(delivered[0].response.is_none());
        assert!(!handle.is_pending());
    }

    #[test]
    fn test_delivered_completion_runs_once() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let (handle, completion) = completion_for(move |result: TerminalResult| {
            assert!(result.is_cancelled());
            *counter.lock() += 1;
        });

        let request = Arc::clone(&completion.request);
        completion.deliver(TerminalResult::failed(request, NetworkError::Cancelled));

        assert_eq!(*calls.lock(), 1);
        assert!(!handle.is_pending());
    }
}
