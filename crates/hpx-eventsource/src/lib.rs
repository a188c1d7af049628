//! # hpx-eventsource
//!
//! Resilient client for server-push event streams.
//!
//! The client keeps one streaming connection alive, bounds automatic
//! reconnection with a fixed retry interval and retry cap, fans inbound events
//! out to per-type listeners, and reports every lifecycle transition to an
//! application-wide dispatch bus.
//!
//! ## Features
//!
//! - **Explicit state machine**: `Idle`, `Connecting`, `Open`, `Reconnecting`
//!   and `Closed`, driven by a pure [`ConnectionMachine`]
//! - **Bounded retries**: exactly `max_retries` automatic reconnects, with the
//!   counter reset whenever a connection opens or `connect` is called
//! - **Cancellable timers**: establishment timeouts and retry delays never
//!   fire after a disconnect or a newer connection attempt
//! - **Pluggable transports**: any [`Transport`] works; an HTTP Server-Sent
//!   Events transport ships behind the `http` feature
//! - **Observability**: structured `tracing` logs and a [`Dispatcher`] that
//!   receives `eventsource/*` notifications
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hpx_eventsource::{
//!     ConnectionOptions, EventSourceClient, Listener, NoopDispatcher,
//!     transport::http::HttpTransport,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ConnectionOptions::new("https://api.example.com/stream");
//!     let client = EventSourceClient::new(options, HttpTransport::new(), NoopDispatcher)?;
//!
//!     client.on_message(|event| println!("{}: {}", event.event_type, event.payload));
//!     client.add_event_listener("update", Listener::new(|event| println!("update {}", event.payload)));
//!     client.connect(None)?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.disconnect();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod machine;
pub mod manager;
pub mod retry;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use client::EventSourceClient;
pub use config::{ConnectionOptions, OptionsPatch};
pub use dispatch::{ChannelDispatcher, Dispatcher, NoopDispatcher, Notification, NotificationKind};
pub use error::{EventSourceError, EventSourceResult};
pub use listener::{Listener, ListenerRegistry};
pub use machine::ConnectionMachine;
pub use manager::{ConnectionManager, MessageCallback};
pub use retry::{RetryDecision, RetryPolicy};
#[cfg(feature = "http")]
pub use transport::http::HttpTransport;
pub use transport::{HandleId, SignalSender, Transport, TransportHandle};
pub use types::{ConnectionState, DEFAULT_EVENT_TYPE, Signal, StreamEvent};
