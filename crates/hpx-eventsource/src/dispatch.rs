//! Notifications published to the application's dispatch bus.
//!
//! Every `open`, `error` and inbound `message` transition, plus every accepted
//! [`send_message`](crate::EventSourceClient::send_message) call, produces a
//! [`Notification`]. Delivery is fire-and-forget: the connection manager never
//! inspects the outcome, and a failing [`Dispatcher`] cannot affect the state
//! machine.

use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::trace;

use crate::{error::EventSourceError, types::StreamEvent};

/// Kind of a dispatched notification, serialized as its `type` string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum NotificationKind {
    /// The connection opened.
    #[serde(rename = "eventsource/open")]
    Open,
    /// An event arrived.
    #[serde(rename = "eventsource/message")]
    Message,
    /// A connection attempt or an open connection failed.
    #[serde(rename = "eventsource/error")]
    Error,
    /// The application attempted a send.
    #[serde(rename = "eventsource/send")]
    Send,
}

impl NotificationKind {
    /// The `type` string carried by notifications of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "eventsource/open",
            Self::Message => "eventsource/message",
            Self::Error => "eventsource/error",
            Self::Send => "eventsource/send",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured `{type, payload}` record sent to the dispatch bus.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    /// Notification type.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Arbitrary JSON payload.
    pub payload: Value,
}

impl Notification {
    /// Create a notification.
    pub fn new(kind: NotificationKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// The connection to `endpoint` opened.
    pub fn open(endpoint: &str) -> Self {
        Self::new(NotificationKind::Open, json!({ "endpoint": endpoint }))
    }

    /// An event arrived.
    pub fn message(event: &StreamEvent) -> Self {
        Self::new(
            NotificationKind::Message,
            json!({
                "id": event.id,
                "eventType": event.event_type,
                "payload": event.payload,
            }),
        )
    }

    /// The connection failed while the retry counter stood at `retry_count`.
    pub fn error(error: &EventSourceError, retry_count: u32) -> Self {
        Self::new(
            NotificationKind::Error,
            json!({
                "kind": error.kind(),
                "reason": error.to_string(),
                "retryCount": retry_count,
            }),
        )
    }

    /// The application attempted to send `data`.
    pub fn send(data: &str, event_type: Option<&str>) -> Self {
        Self::new(
            NotificationKind::Send,
            json!({ "data": data, "eventType": event_type }),
        )
    }
}

/// The external, application-wide notification sink.
///
/// Implementations must return promptly and must not block the caller.
pub trait Dispatcher: Send + Sync + 'static {
    /// Accept a notification.
    fn dispatch(&self, notification: Notification);
}

impl<F> Dispatcher for F
where
    F: Fn(Notification) + Send + Sync + 'static,
{
    fn dispatch(&self, notification: Notification) {
        self(notification);
    }
}

/// Dispatcher that discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDispatcher;

impl Dispatcher for NoopDispatcher {
    fn dispatch(&self, _notification: Notification) {}
}

/// Dispatcher that forwards notifications into an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the receiver that observes it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::from_sender(tx), rx)
    }

    /// Wrap an existing sender, so several clients can share one bus.
    pub fn from_sender(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, notification: Notification) {
        if let Err(err) = self.tx.send(notification) {
            trace!(kind = %err.0.kind, "Dispatch receiver dropped");
        }
    }
}
