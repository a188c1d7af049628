//! Transport capability abstraction.
//!
//! A [`Transport`] opens one streaming connection per call and reports its
//! progress through a [`SignalSender`] as [`Signal`]s: `Open`, then any number
//! of `Message`s, and finally at most one `Error`. The returned
//! [`TransportHandle`] lets the connection manager close the connection.
//!
//! The manager is transport-agnostic: the HTTP Server-Sent Events transport
//! (feature `http`), a polyfill or a test double are interchangeable.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    config::ConnectionOptions,
    error::EventSourceResult,
    manager::Input,
    types::{Signal, StreamEvent},
};

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub(crate) mod parse;

/// Identity of a transport handle, unique per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

/// Sends signals for one transport handle to its connection manager.
///
/// Every signal is stamped with the [`HandleId`] of the handle it belongs
/// to; the manager ignores signals from handles it no longer owns.
#[derive(Clone, Debug)]
pub struct SignalSender {
    handle: HandleId,
    tx: mpsc::UnboundedSender<Input>,
}

impl SignalSender {
    pub(crate) fn new(handle: HandleId, tx: mpsc::UnboundedSender<Input>) -> Self {
        Self { handle, tx }
    }

    /// The handle these signals belong to.
    pub fn handle_id(&self) -> HandleId {
        self.handle
    }

    /// Deliver a signal.
    ///
    /// Returns `false` if the manager has shut down.
    pub fn send(&self, signal: Signal) -> bool {
        self.tx
            .send(Input::Signal {
                handle: self.handle,
                signal,
            })
            .is_ok()
    }

    /// Report that the connection opened.
    pub fn open(&self) -> bool {
        self.send(Signal::Open)
    }

    /// Report an inbound event.
    pub fn message(&self, event: StreamEvent) -> bool {
        self.send(Signal::Message(event))
    }

    /// Report a failure.
    pub fn error(&self, reason: impl Into<String>) -> bool {
        self.send(Signal::Error(reason.into()))
    }

    /// Returns `true` if the manager has shut down. Transports can stop
    /// early once nobody listens.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A single open (or opening) transport connection.
pub trait TransportHandle: Send {
    /// Close the connection. Must not block and must be idempotent.
    fn close(&mut self);

    /// Returns `true` while the connection is open. The manager logs it
    /// when it closes a handle.
    fn is_open(&self) -> bool;
}

/// Factory for transport connections.
pub trait Transport: Send + Sync + 'static {
    /// Start opening a connection with `options`.
    ///
    /// Must return as soon as the handle exists; opening completes
    /// asynchronously and is reported through `signals`.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle cannot be created at all. A retryable
    /// error is handled like an `Error` signal from the new handle. Any
    /// other error closes the client without a retry and is returned from
    /// the `connect` or `reconnect` call that asked for the open.
    fn open(
        &self,
        options: &ConnectionOptions,
        signals: SignalSender,
    ) -> EventSourceResult<Box<dyn TransportHandle>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn open(
        &self,
        options: &ConnectionOptions,
        signals: SignalSender,
    ) -> EventSourceResult<Box<dyn TransportHandle>> {
        (**self).open(options, signals)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(
        &self,
        options: &ConnectionOptions,
        signals: SignalSender,
    ) -> EventSourceResult<Box<dyn TransportHandle>> {
        (**self).open(options, signals)
    }
}
