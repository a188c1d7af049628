//! The public event stream client.

use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    config::{ConnectionOptions, OptionsPatch},
    dispatch::Dispatcher,
    error::EventSourceResult,
    listener::{Listener, ListenerRegistry},
    manager::ConnectionManager,
    transport::Transport,
    types::{ConnectionState, StreamEvent},
};

/// Streaming event client.
///
/// Combines a [`ConnectionManager`] with a [`ListenerRegistry`]. The control
/// surface is synchronous: [`connect`](Self::connect) returns as soon as a
/// transport handle exists and the connection's progress is observed through
/// [`state`](Self::state), [`subscribe_state`](Self::subscribe_state) and the
/// dispatch bus.
///
/// Must be created inside a tokio runtime. Dropping the client closes the
/// connection and cancels every pending timer.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
///
/// use hpx_eventsource::{
///     ConnectionOptions, EventSourceClient, Listener, NoopDispatcher, OptionsPatch,
///     transport::http::HttpTransport,
/// };
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let options = ConnectionOptions::new("https://api.example.com/stream")
///     .retry_interval(Duration::from_secs(2))
///     .max_retries(5);
/// let client = EventSourceClient::new(options, HttpTransport::new(), NoopDispatcher)?;
///
/// client.add_event_listener(
///     "update",
///     Listener::new(|event| println!("update: {}", event.payload())),
/// );
/// client.connect(None)?;
///
/// // Later: switch endpoints for the next connection.
/// client.update_options(&OptionsPatch::new().endpoint("https://backup.example.com/stream"));
/// client.reconnect()?;
/// # Ok(())
/// # }
/// ```
pub struct EventSourceClient {
    manager: ConnectionManager,
    listeners: Arc<ListenerRegistry>,
}

impl EventSourceClient {
    /// Create an idle client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when called outside a tokio runtime.
    pub fn new<T, D>(options: ConnectionOptions, transport: T, dispatcher: D) -> EventSourceResult<Self>
    where
        T: Transport,
        D: Dispatcher,
    {
        let listeners = Arc::new(ListenerRegistry::new());
        let manager = ConnectionManager::new(options, transport, dispatcher, Arc::clone(&listeners))?;
        Ok(Self { manager, listeners })
    }

    /// Connect, merging `overrides` into the stored options first.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the merged endpoint is empty, or the
    /// transport's error if it refuses to open; see
    /// [`ConnectionManager::connect`](crate::ConnectionManager::connect).
    pub fn connect(&self, overrides: Option<OptionsPatch>) -> EventSourceResult<()> {
        self.manager.connect(overrides.as_ref())
    }

    /// Close the connection. Idempotent.
    pub fn disconnect(&self) {
        self.manager.disconnect();
    }

    /// Disconnect, then connect again without waiting for the retry interval.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the stored endpoint is empty; the
    /// client then stays `Idle` if it never connected, or ends up `Closed`.
    /// Transport refusals are returned as in [`connect`](Self::connect).
    pub fn reconnect(&self) -> EventSourceResult<()> {
        self.manager.reconnect()
    }

    /// `true` if and only if the connection is open.
    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Record an attempted send on the dispatch bus.
    ///
    /// The stream is server-to-client: nothing is written to the wire and
    /// delivery must not be assumed.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::NotConnected`](crate::EventSourceError::NotConnected)
    /// unless the connection is open.
    pub fn send_message(&self, data: &str, event_type: Option<&str>) -> EventSourceResult<()> {
        self.manager.send_message(data, event_type)
    }

    /// Register `listener` for events of `event_type`.
    ///
    /// Returns `false` if it was already registered for that type.
    pub fn add_event_listener(&self, event_type: impl Into<String>, listener: Listener) -> bool {
        self.listeners.add(event_type, listener)
    }

    /// Remove `listener` from `event_type`. Returns `true` if it was registered.
    pub fn remove_event_listener(&self, event_type: &str, listener: &Listener) -> bool {
        self.listeners.remove(event_type, listener)
    }

    /// Set the global callback invoked for every event before the listeners.
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.manager.set_on_message(Some(Arc::new(callback)));
    }

    /// Remove the global message callback.
    pub fn clear_on_message(&self) {
        self.manager.set_on_message(None);
    }

    /// Merge `patch` into the stored options for the next connect.
    pub fn update_options(&self, patch: &OptionsPatch) {
        self.manager.update_options(patch);
    }

    /// A copy of the stored options.
    pub fn options(&self) -> ConnectionOptions {
        self.manager.options()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Current retry counter.
    pub fn retry_count(&self) -> u32 {
        self.manager.retry_count()
    }

    /// Watch every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe_state()
    }

    /// The listener registry.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}
