//! HTTP Server-Sent Events transport built on `reqwest`.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures_util::StreamExt;
use http::{
    HeaderMap, HeaderValue,
    header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, COOKIE, PROXY_AUTHORIZATION},
};
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, Url};
use tokio::{runtime::Handle, task::AbortHandle};
use tracing::{debug, info, warn};

use super::{SignalSender, Transport, TransportHandle, parse::EventParser};
use crate::{
    config::ConnectionOptions,
    error::{EventSourceError, EventSourceResult},
};

const EVENT_STREAM: &str = "text/event-stream";
const LAST_EVENT_ID: &str = "last-event-id";

/// Opens `GET` requests that stream `text/event-stream` bodies.
///
/// The id of the last event received is remembered across connections and
/// sent as `Last-Event-ID` when reopening. Credential headers
/// (`Authorization`, `Proxy-Authorization`, `Cookie`) are only sent when
/// [`ConnectionOptions::with_credentials`] is set.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: Client,
    last_event_id: Arc<Mutex<Option<String>>>,
}

impl HttpTransport {
    /// Create a transport with a default `reqwest` client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that sends requests through `client`.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            last_event_id: Arc::default(),
        }
    }

    /// The id of the last event received, if any.
    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id.lock().clone()
    }

    fn request(&self, options: &ConnectionOptions) -> EventSourceResult<RequestBuilder> {
        let url = Url::parse(&options.endpoint).map_err(|e| {
            EventSourceError::config(format!("Invalid endpoint {}: {e}", options.endpoint))
        })?;

        let mut headers = options.headers.clone();
        if !options.with_credentials {
            strip_credentials(&mut headers);
        }
        headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Some(id) = self.last_event_id.lock().as_deref()
            && let Ok(value) = HeaderValue::from_str(id)
        {
            headers.insert(LAST_EVENT_ID, value);
        }

        Ok(self.client.get(url).headers(headers))
    }
}

impl Transport for HttpTransport {
    fn open(
        &self,
        options: &ConnectionOptions,
        signals: SignalSender,
    ) -> EventSourceResult<Box<dyn TransportHandle>> {
        let runtime = Handle::try_current()
            .map_err(|e| EventSourceError::config(format!("No tokio runtime available: {e}")))?;
        let request = self.request(options)?;
        let open = Arc::new(AtomicBool::new(false));

        info!(url = %options.endpoint, handle = signals.handle_id().0, "SSE connecting");
        let task = runtime
            .spawn(stream_events(
                request,
                signals,
                Arc::clone(&open),
                Arc::clone(&self.last_event_id),
            ))
            .abort_handle();

        Ok(Box::new(HttpHandle { task, open }))
    }
}

/// Handle to one in-flight HTTP event stream.
#[derive(Debug)]
pub struct HttpHandle {
    task: AbortHandle,
    open: Arc<AtomicBool>,
}

impl TransportHandle for HttpHandle {
    fn close(&mut self) {
        self.task.abort();
        self.open.store(false, Ordering::Release);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Drop for HttpHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn strip_credentials(headers: &mut HeaderMap) {
    for name in [AUTHORIZATION, PROXY_AUTHORIZATION, COOKIE] {
        headers.remove(name);
    }
}

/// Runs one connection and reports its end as an error signal.
async fn stream_events(
    request: RequestBuilder,
    signals: SignalSender,
    open: Arc<AtomicBool>,
    last_event_id: Arc<Mutex<Option<String>>>,
) {
    let reason = match read_stream(request, &signals, &open, &last_event_id).await {
        Ok(()) => "SSE stream ended".to_string(),
        Err(EventSourceError::Transport { message }) => message,
        Err(err) => err.to_string(),
    };
    open.store(false, Ordering::Release);
    if signals.is_closed() {
        debug!(handle = signals.handle_id().0, reason = %reason, "SSE connection ended after shutdown");
        return;
    }
    warn!(handle = signals.handle_id().0, reason = %reason, "SSE connection lost");
    signals.error(reason);
}

async fn read_stream(
    request: RequestBuilder,
    signals: &SignalSender,
    open: &AtomicBool,
    last_event_id: &Mutex<Option<String>>,
) -> EventSourceResult<()> {
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(EventSourceError::transport(format!(
            "Unexpected SSE status: {status}"
        )));
    }
    if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
        let content_type = content_type.to_str().unwrap_or("");
        if !content_type.contains(EVENT_STREAM) {
            return Err(EventSourceError::transport(format!(
                "Unexpected SSE content type: {content_type}"
            )));
        }
    }

    open.store(true, Ordering::Release);
    info!(handle = signals.handle_id().0, "SSE connection established");
    if !signals.open() {
        return Ok(());
    }

    let mut parser = EventParser::with_last_event_id(last_event_id.lock().clone());
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let events = parser
            .feed(&chunk?)
            .map_err(|e| EventSourceError::transport(format!("Invalid UTF-8 in SSE stream: {e}")))?;
        *last_event_id.lock() = parser.last_event_id().map(str::to_string);

        for event in events {
            debug!(
                event_type = %event.event_type,
                id = ?event.id,
                "SSE event received"
            );
            if !signals.message(event) {
                return Ok(());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_stripped_unless_enabled() {
        let transport = HttpTransport::new();
        let options = ConnectionOptions::new("http://localhost/stream")
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer t"))
            .header(COOKIE, HeaderValue::from_static("a=b"));

        let request = transport
            .request(&options)
            .expect("request")
            .build()
            .expect("build");
        assert!(request.headers().get(AUTHORIZATION).is_none());
        assert!(request.headers().get(COOKIE).is_none());
        assert_eq!(request.headers()[ACCEPT], EVENT_STREAM);

        let request = transport
            .request(&options.with_credentials(true))
            .expect("request")
            .build()
            .expect("build");
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer t");
    }

    #[test]
    fn test_last_event_id_header() {
        let transport = HttpTransport::new();
        *transport.last_event_id.lock() = Some("17".to_string());

        let request = transport
            .request(&ConnectionOptions::new("http://localhost/stream"))
            .expect("request")
            .build()
            .expect("build");
        assert_eq!(request.headers()[LAST_EVENT_ID], "17");
        assert_eq!(request.headers()[CACHE_CONTROL], "no-cache");
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_endpoint() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let signals = SignalSender::new(crate::transport::HandleId(1), tx);
        let err = HttpTransport::new()
            .open(&ConnectionOptions::new("not a url"), signals)
            .err()
            .expect("invalid url");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_no_signal_after_manager_shutdown() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let signals = SignalSender::new(crate::transport::HandleId(1), tx);
        assert!(signals.is_closed());

        // Port 9 (discard) refuses quickly; the task must finish quietly.
        let transport = HttpTransport::new();
        let request = transport
            .request(&ConnectionOptions::new("http://127.0.0.1:9/stream"))
            .expect("request");
        let open = Arc::new(AtomicBool::new(false));
        stream_events(request, signals, Arc::clone(&open), Arc::default()).await;
        assert!(!open.load(Ordering::Acquire));
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let err = HttpTransport::new()
            .request(&ConnectionOptions::new("not a url"))
            .expect_err("invalid url");
        assert_eq!(err.kind(), "config");
    }
}
