//! Shared test doubles: a scripted transport and a recording dispatcher.

#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use hpx_eventsource::{
    ConnectionOptions, EventSourceError, EventSourceResult, Notification, NotificationKind,
    SignalSender, StreamEvent, Transport, TransportHandle,
};
use parking_lot::Mutex;
use tokio::time::Instant;

/// One call to [`FakeTransport::open`].
#[derive(Clone)]
pub struct Opened {
    pub signals: SignalSender,
    pub options: ConnectionOptions,
    pub at: Instant,
    pub closed: Arc<AtomicBool>,
}

impl Opened {
    pub fn open(&self) {
        self.signals.open();
    }

    pub fn message(&self, event_type: &str, payload: &str) {
        self.signals.message(StreamEvent::new(event_type, payload));
    }

    pub fn error(&self, reason: &str) {
        self.signals.error(reason);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Transport that records every open and never signals on its own.
#[derive(Clone, Default)]
pub struct FakeTransport {
    opened: Arc<Mutex<Vec<Opened>>>,
    refuse: Arc<AtomicBool>,
    reject: Arc<AtomicBool>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent opens fail synchronously.
    pub fn refuse_opens(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make subsequent opens fail with a non-retryable configuration error.
    pub fn reject_opens(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn nth(&self, index: usize) -> Opened {
        self.opened.lock()[index].clone()
    }

    pub fn last(&self) -> Opened {
        self.opened
            .lock()
            .last()
            .cloned()
            .expect("transport was never opened")
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.opened.lock().iter().map(|o| o.at).collect()
    }
}

struct FakeHandle {
    closed: Arc<AtomicBool>,
}

impl TransportHandle for FakeHandle {
    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for FakeTransport {
    fn open(
        &self,
        options: &ConnectionOptions,
        signals: SignalSender,
    ) -> EventSourceResult<Box<dyn TransportHandle>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(EventSourceError::transport("refused"));
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(EventSourceError::config("unsupported endpoint"));
        }
        let closed = Arc::new(AtomicBool::new(false));
        self.opened.lock().push(Opened {
            signals,
            options: options.clone(),
            at: Instant::now(),
            closed: Arc::clone(&closed),
        });
        Ok(Box::new(FakeHandle { closed }))
    }
}

/// Dispatcher that records every notification.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatcher(&self) -> impl Fn(Notification) + Send + Sync + 'static {
        let seen = Arc::clone(&self.seen);
        move |notification| seen.lock().push(notification)
    }

    pub fn all(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.seen.lock().iter().map(|n| n.kind).collect()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.seen.lock().iter().filter(|n| n.kind == kind).count()
    }
}

/// Options with short timers for virtual-time tests.
pub fn fast_options() -> ConnectionOptions {
    ConnectionOptions::new("https://stream.test/events")
        .timeout(Duration::from_millis(50))
        .retry_interval(Duration::from_millis(10))
        .max_retries(2)
}

/// Let the input pump drain everything already queued.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
