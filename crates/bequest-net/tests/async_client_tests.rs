//! Integration tests for background requests and their completion delivery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bequest_net::NetworkError;
use bequest_net::http::{
    AsyncHttpClient, ContentType, HttpMethod, Parameters, ProgressEvent, ProgressSink,
    RequestEvent, RequestSpec, TerminalResult, build_request,
};
use http::HeaderMap;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(10);

async fn wait_for(rx: oneshot::Receiver<TerminalResult>) -> TerminalResult {
    tokio::time::timeout(WAIT, rx)
        .await
        .expect("Timed out waiting for completion")
        .expect("Completion was dropped")
}

/// Serve one response of `total` bytes, written `chunk` bytes at a time with
/// `pause` between writes. Returns the URL to fetch.
async fn spawn_trickle_server(total: usize, chunk: usize, pause: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;

        let head = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/octet-stream\r\ncontent-length: {total}\r\n\r\n"
        );
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        let block = vec![0x5Au8; chunk];
        for _ in 0..total / chunk {
            if socket.write_all(&block).await.is_err() {
                return;
            }
            tokio::time::sleep(pause).await;
        }
    });

    format!("http://{addr}/stream")
}

fn get(url: &str) -> RequestSpec {
    build_request(url, "GET", &HeaderMap::new(), &Default::default()).unwrap()
}

#[tokio::test]
async fn test_request_completes_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = AsyncHttpClient::new();
    let (tx, rx) = oneshot::channel();
    let handle = client
        .request(&format!("{}/get", mock_server.uri()), move |result| {
            let _ = tx.send(result);
        })
        .expect("Request should start");

    let result = wait_for(rx).await;
    assert_eq!(result.status(), Some(200));
    assert_eq!(result.request.method(), HttpMethod::Get);
    assert_eq!(result.decoded().unwrap().content_type, ContentType::Json);
    assert!(!handle.is_pending());
}

#[tokio::test]
async fn test_unknown_method_fails_synchronously() {
    let client = AsyncHttpClient::new();
    let called = Arc::new(Mutex::new(false));
    let flag = called.clone();

    let result = client.request_with(
        "http://127.0.0.1:1/",
        "FETCH",
        &HeaderMap::new(),
        &Default::default(),
        None,
        move |_| *flag.lock() = true,
    );

    assert!(matches!(result, Err(NetworkError::UnsupportedMethod(m)) if m == "FETCH"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!*called.lock());
}

#[tokio::test]
async fn test_invalid_url_fails_synchronously() {
    let client = AsyncHttpClient::new();
    let result = client.request("not a url", |_| {});
    assert!(matches!(result, Err(NetworkError::InvalidUrl(_))));
}

#[tokio::test]
async fn test_post_with_parameters() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/post"))
        .and(wiremock::matchers::body_string("one=two"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;

    let client = AsyncHttpClient::new();
    let parameters: Parameters = [("one".to_string(), "two".to_string())].into_iter().collect();
    let (tx, rx) = oneshot::channel();
    client
        .request_with(
            &format!("{}/post", mock_server.uri()),
            "post",
            &HeaderMap::new(),
            &parameters,
            None,
            move |result| {
                let _ = tx.send(result);
            },
        )
        .expect("Request should start");

    let result = wait_for(rx).await;
    assert_eq!(result.request.method(), HttpMethod::Post);
    assert_eq!(result.status(), Some(201));
}

#[tokio::test]
async fn test_progress_precedes_completion() {
    let mock_server = MockServer::start().await;
    let body = vec![7u8; 256 * 1024];

    Mock::given(method("GET"))
        .and(path("/large"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&mock_server)
        .await;

    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let sink: ProgressSink = Arc::new(move |request: &RequestSpec, event: &ProgressEvent| {
        assert!(request.target().ends_with("/large"));
        sink_events.lock().push(*event);
    });

    let completion_events = events.clone();
    let (tx, rx) = oneshot::channel();
    let client = AsyncHttpClient::new();
    client
        .request_with(
            &format!("{}/large", mock_server.uri()),
            "GET",
            &HeaderMap::new(),
            &Default::default(),
            Some(sink),
            move |result| {
                let seen = completion_events.lock().len();
                let _ = tx.send((seen, result));
            },
        )
        .expect("Request should start");

    let (seen_at_completion, result) = tokio::time::timeout(WAIT, rx)
        .await
        .expect("Timed out waiting for completion")
        .expect("Completion was dropped");

    assert_eq!(result.status(), Some(200));
    assert!(seen_at_completion > 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let events = events.lock();
    assert_eq!(events.len(), seen_at_completion, "progress arrived after completion");
    assert_eq!(events.last().unwrap().bytes_transferred, body.len() as u64);
}

#[tokio::test]
async fn test_event_channel_ordering() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/large"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 128 * 1024]))
        .mount(&mock_server)
        .await;

    let client = AsyncHttpClient::new();
    let (_handle, mut events) = client.request_events(get(&format!("{}/large", mock_server.uri())));

    let mut received = Vec::new();
    while let Some(event) = tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("Timed out waiting for events")
    {
        received.push(event);
    }

    let finished = received
        .iter()
        .filter(|e| matches!(e, RequestEvent::Finished(_)))
        .count();
    assert_eq!(finished, 1);
    assert!(matches!(received.last(), Some(RequestEvent::Finished(_))));

    let transferred: Vec<u64> = received
        .iter()
        .filter_map(|e| match e {
            RequestEvent::Progress(p) => Some(p.bytes_transferred),
            RequestEvent::Finished(_) => None,
        })
        .collect();
    assert!(!transferred.is_empty());
    assert!(transferred.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_transport_failure_is_delivered() {
    let client = AsyncHttpClient::new();
    let (_handle, events) = client.request_events(get("http://127.0.0.1:1/"));

    let result = tokio::time::timeout(WAIT, events.finished())
        .await
        .expect("Timed out waiting for completion")
        .expect("Channel closed without a result");

    assert!(result.response.is_none());
    assert!(result.error().is_some_and(NetworkError::is_transport));
}

#[tokio::test]
async fn test_cancel_pending_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let client = AsyncHttpClient::new();
    let (tx, rx) = oneshot::channel();
    let handle = client
        .request(&format!("{}/slow", mock_server.uri()), move |result| {
            let _ = tx.send(result);
        })
        .expect("Request should start");

    assert!(handle.is_pending());
    assert!(handle.cancel());
    assert!(!handle.cancel());

    let started = Instant::now();
    let result = wait_for(rx).await;
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(result.is_cancelled());
    assert!(result.response.is_none());
    assert!(!handle.is_pending());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/delayed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"n": 1}))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(6)
        .mount(&mock_server)
        .await;

    let client = AsyncHttpClient::new();
    let url = format!("{}/delayed", mock_server.uri());
    let started = Instant::now();

    let receivers: Vec<_> = (0..6)
        .map(|_| {
            let (tx, rx) = oneshot::channel();
            client
                .request(&url, move |result| {
                    let _ = tx.send(result);
                })
                .expect("Request should start");
            rx
        })
        .collect();

    for rx in receivers {
        let result = wait_for(rx).await;
        assert_eq!(result.status(), Some(200));
    }

    // Six serialised requests would take at least three seconds.
    assert!(started.elapsed() < Duration::from_millis(2500));
}

#[tokio::test]
async fn test_cancel_during_body_transfer_stops_progress() {
    let total = 1024 * 1024;
    let url = spawn_trickle_server(total, 8 * 1024, Duration::from_millis(20)).await;

    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let sink: ProgressSink = Arc::new(move |_: &RequestSpec, event: &ProgressEvent| {
        sink_events.lock().push(*event);
    });

    let client = AsyncHttpClient::new();
    let (tx, rx) = oneshot::channel();
    let handle = client
        .request_with(&url, "GET", &HeaderMap::new(), &Default::default(), Some(sink), move |result| {
            let _ = tx.send(result);
        })
        .expect("Request should start");

    tokio::time::timeout(WAIT, async {
        while events.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("No progress before timeout");

    assert!(handle.cancel());
    let result = wait_for(rx).await;
    assert!(result.is_cancelled());
    assert!(result.response.is_none());

    let seen = events.lock().len();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let events = events.lock();
    assert_eq!(events.len(), seen, "progress continued after cancellation");
    assert!(events.last().unwrap().bytes_transferred < total as u64);
}

#[test]
fn test_requests_outlive_the_runtime_they_were_built_in() {
    let short_lived = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let client = short_lived.block_on(async { AsyncHttpClient::new() });
    drop(short_lived);

    let (tx, rx) = std::sync::mpsc::channel();
    client
        .request("http://127.0.0.1:1/", move |result| {
            let _ = tx.send(result);
        })
        .expect("Request should start");

    let result = rx.recv_timeout(WAIT).expect("Completion was never delivered");
    assert!(result.response.is_none());
    assert!(result.error().is_some_and(NetworkError::is_transport));
}

#[test]
fn test_runtime_shutdown_still_completes() {
    // Accepts connections into the backlog but never answers.
    let silent = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/", silent.local_addr().unwrap());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    let handle = runtime.block_on(async {
        let handle = AsyncHttpClient::new()
            .request(&url, move |result| {
                let _ = tx.send(result);
            })
            .expect("Request should start");
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle
    });
    assert!(handle.is_pending());
    drop(runtime);

    let result = rx.recv_timeout(WAIT).expect("Completion was never delivered");
    assert!(matches!(result.error(), Some(NetworkError::Runtime(_))));
    assert!(result.response.is_none());
    assert!(!handle.is_pending());
}
