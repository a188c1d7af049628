//! Integration tests for the HTTP Server-Sent Events transport.
//!
//! Uses a mock hyper HTTP server to emit SSE bodies, verifying the full
//! request → parse → state machine → listener pipeline.

#![cfg(feature = "http")]

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use hpx_eventsource::{
    ChannelDispatcher, ConnectionOptions, ConnectionState, EventSourceClient, HttpTransport,
    Listener, Notification, NotificationKind, StreamEvent,
};
use http_body_util::Full;
use hyper::{
    Request, Response,
    body::{Bytes, Incoming},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::{net::TcpListener, sync::mpsc, time::timeout};

// ---------------------------------------------------------------------------
// Mock SSE server helpers
// ---------------------------------------------------------------------------

type Seen = Arc<Mutex<Vec<Option<String>>>>;

/// Start a mock server answering each connection with the next scripted
/// response. Records the `Last-Event-ID` header of every request.
async fn start_sse_server(responses: Vec<(&'static str, &'static str, u16)>) -> (SocketAddr, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    let responses = Arc::new(Mutex::new(responses.into_iter()));
    let seen: Seen = Arc::default();
    let recorded = Arc::clone(&seen);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let next = responses.lock().next();
            let Some((body, content_type, status)) = next else {
                continue;
            };
            let recorded = Arc::clone(&recorded);
            let io = TokioIo::new(stream);
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(move |req: Request<Incoming>| {
                            recorded.lock().push(
                                req.headers()
                                    .get("last-event-id")
                                    .and_then(|v| v.to_str().ok())
                                    .map(str::to_string),
                            );
                            let resp = Response::builder()
                                .status(status)
                                .header("content-type", content_type)
                                .body(Full::new(Bytes::from(body)))
                                .expect("build response");
                            async move { Ok::<_, Infallible>(resp) }
                        }),
                    )
                    .await;
            });
        }
    });

    (addr, seen)
}

fn options(addr: SocketAddr, max_retries: u32) -> ConnectionOptions {
    ConnectionOptions::new(format!("http://{addr}/stream"))
        .timeout(Duration::from_secs(2))
        .retry_interval(Duration::from_millis(20))
        .max_retries(max_retries)
}

async fn next_notification(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timeout")
        .expect("notification")
}

async fn wait_for_state(client: &EventSourceClient, state: ConnectionState) {
    let mut states = client.subscribe_state();
    timeout(Duration::from_secs(2), states.wait_for(|s| *s == state))
        .await
        .expect("timeout")
        .expect("state sender alive");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_events_reach_listeners_and_bus() {
    let body = "event: update\ndata: {\"price\":42000}\nid: evt-1\n\n: keep-alive\ndata: hello\ndata: world\n\n";
    let (addr, _seen) = start_sse_server(vec![(body, "text/event-stream", 200)]).await;

    let (dispatcher, mut notifications) = ChannelDispatcher::new();
    let client =
        EventSourceClient::new(options(addr, 0), HttpTransport::new(), dispatcher).expect("client");

    let (tx, mut events) = mpsc::unbounded_channel::<StreamEvent>();
    let updates = tx.clone();
    client.add_event_listener(
        "update",
        Listener::new(move |event| {
            let _ = updates.send(event.clone());
        }),
    );
    client.add_event_listener(
        "message",
        Listener::new(move |event| {
            let _ = tx.send(event.clone());
        }),
    );
    client.connect(None).expect("connect");

    let first = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timeout")
        .expect("event");
    assert_eq!(first.event_type(), "update");
    assert_eq!(first.payload(), "{\"price\":42000}");
    assert_eq!(first.id(), Some("evt-1"));

    let second = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timeout")
        .expect("event");
    assert_eq!(second.event_type(), "message");
    assert_eq!(second.payload(), "hello\nworld");
    assert_eq!(second.id(), Some("evt-1"));

    assert_eq!(next_notification(&mut notifications).await.kind, NotificationKind::Open);
    assert_eq!(next_notification(&mut notifications).await.kind, NotificationKind::Message);
    assert_eq!(next_notification(&mut notifications).await.kind, NotificationKind::Message);

    // The body ends; with no retries left the client closes.
    let error = next_notification(&mut notifications).await;
    assert_eq!(error.kind, NotificationKind::Error);
    wait_for_state(&client, ConnectionState::Closed).await;
}

#[tokio::test]
async fn test_non_success_status_fails_without_open() {
    let (addr, _seen) = start_sse_server(vec![("", "text/event-stream", 503)]).await;

    let (dispatcher, mut notifications) = ChannelDispatcher::new();
    let client =
        EventSourceClient::new(options(addr, 0), HttpTransport::new(), dispatcher).expect("client");
    client.connect(None).expect("connect");

    let error = next_notification(&mut notifications).await;
    assert_eq!(error.kind, NotificationKind::Error);
    assert!(
        error.payload["reason"]
            .as_str()
            .expect("reason")
            .contains("503")
    );
    wait_for_state(&client, ConnectionState::Closed).await;
}

#[tokio::test]
async fn test_wrong_content_type_fails() {
    let (addr, _seen) = start_sse_server(vec![("data: x\n\n", "application/json", 200)]).await;

    let (dispatcher, mut notifications) = ChannelDispatcher::new();
    let client =
        EventSourceClient::new(options(addr, 0), HttpTransport::new(), dispatcher).expect("client");
    client.connect(None).expect("connect");

    let error = next_notification(&mut notifications).await;
    assert_eq!(error.kind, NotificationKind::Error);
    assert!(
        error.payload["reason"]
            .as_str()
            .expect("reason")
            .contains("content type")
    );
}

#[tokio::test]
async fn test_reconnect_resumes_with_last_event_id() {
    let (addr, seen) = start_sse_server(vec![
        ("id: 5\ndata: first\n\n", "text/event-stream", 200),
        ("data: second\n\n", "text/event-stream", 200),
    ])
    .await;

    let transport = HttpTransport::new();
    let (dispatcher, mut notifications) = ChannelDispatcher::new();
    let client =
        EventSourceClient::new(options(addr, 1), transport.clone(), dispatcher).expect("client");
    client.connect(None).expect("connect");

    let mut opens = 0;
    while opens < 2 {
        if next_notification(&mut notifications).await.kind == NotificationKind::Open {
            opens += 1;
        }
    }

    let seen = seen.lock().clone();
    assert_eq!(seen[..2], [None, Some("5".to_string())]);
    assert_eq!(transport.last_event_id(), Some("5".to_string()));
}

#[tokio::test]
async fn test_invalid_url_is_returned_from_connect() {
    let (dispatcher, mut notifications) = ChannelDispatcher::new();
    let options = ConnectionOptions::new("not a url").max_retries(2);
    let client = EventSourceClient::new(options, HttpTransport::new(), dispatcher).expect("client");

    let err = client.connect(None).expect_err("invalid url");
    assert_eq!(err.kind(), "config");
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.retry_count(), 0);

    let error = notifications.try_recv().expect("error notification");
    assert_eq!(error.kind, NotificationKind::Error);
    assert_eq!(error.payload["kind"], "config");
    assert!(
        !error.payload["reason"]
            .as_str()
            .expect("reason")
            .contains("Transport error")
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(notifications.try_recv().is_err());
}
