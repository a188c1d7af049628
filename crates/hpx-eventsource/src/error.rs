//! Error handling for the event stream client.

use std::time::Duration;

use thiserror::Error;

/// The main result type used throughout the crate.
pub type EventSourceResult<T> = Result<T, EventSourceError>;

/// Errors raised by the client, its state machine and its transports.
#[derive(Error, Debug)]
pub enum EventSourceError {
    /// Invalid or incomplete configuration (e.g. an empty endpoint).
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong with the configuration.
        message: String,
    },

    /// Failure signalled by the transport while connecting or open.
    #[error("Transport error: {message}")]
    Transport {
        /// Reason reported by the transport.
        message: String,
    },

    /// The connection did not open within the establishment timeout.
    #[error("Connection timed out after {duration:?}")]
    Timeout {
        /// The establishment timeout that elapsed.
        duration: Duration,
    },

    /// An operation that requires an open connection was attempted without one.
    #[error("Not connected")]
    NotConnected,

    /// HTTP errors raised inside the HTTP transport.
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EventSourceError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Returns `true` for failures that the retry policy recovers from.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            #[cfg(feature = "http")]
            Self::Http(_) => true,
            Self::Config { .. } | Self::NotConnected => false,
        }
    }

    /// Short label used in dispatched error notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::NotConnected => "not_connected",
            #[cfg(feature = "http")]
            Self::Http(_) => "http",
        }
    }
}
