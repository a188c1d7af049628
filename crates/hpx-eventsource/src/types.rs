//! Core type definitions for event handling.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Event type assigned to messages that do not name one.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// A single inbound event produced by a transport.
///
/// Events are forwarded to listeners and the dispatch bus, never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    /// The last event ID, if the server set one.
    pub id: Option<String>,
    /// The event type label used for listener routing.
    pub event_type: String,
    /// The data payload.
    pub payload: String,
}

impl StreamEvent {
    /// Create an event with the given type and payload.
    pub fn new(event_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: None,
            event_type: event_type.into(),
            payload: payload.into(),
        }
    }

    /// Create an event of the default `"message"` type.
    pub fn message(payload: impl Into<String>) -> Self {
        Self::new(DEFAULT_EVENT_TYPE, payload)
    }

    /// Set the event ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Convenience accessor for the event type.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Convenience accessor for the payload.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Convenience accessor for the event ID.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Parse the payload as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Signal surfaced by a transport handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    /// The connection is open.
    Open,
    /// An event arrived.
    Message(StreamEvent),
    /// The connection failed; the handle delivers nothing further.
    Error(String),
}

impl Signal {
    /// Short label for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Message(_) => "message",
            Self::Error(_) => "error",
        }
    }
}

/// Connection state machine states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created, never connected.
    #[default]
    Idle,
    /// A transport handle exists and has not opened yet.
    Connecting,
    /// Actively receiving events.
    Open,
    /// Waiting for the retry interval before the next attempt.
    Reconnecting,
    /// Stopped; nothing happens until the next explicit connect.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if the connection is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if the connection is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` while a connection or reconnection is in progress.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}
