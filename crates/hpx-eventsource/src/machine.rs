//! Connection state machine.
//!
//! # Architecture: Action-Based State Machine
//!
//! [`ConnectionMachine`] performs no I/O and owns no timers. Each input
//! (a control call, a transport signal, a timer expiry) mutates the machine and
//! returns the [`Action`]s the driver must execute: open or close a transport
//! handle, arm or cancel timers, dispatch notifications, deliver events.
//!
//! ```text
//!            connect                  Open signal
//!   ┌──────┐ ───────► ┌────────────┐ ───────────► ┌──────┐
//!   │ Idle │          │ Connecting │              │ Open │◄─┐ Message
//!   └──────┘          └────────────┘              └──────┘──┘
//!                       ▲     │ Error / timeout       │ Error
//!          retry timer  │     ▼                       ▼
//!                     ┌──────────────┐  retries left  (same decision)
//!                     │ Reconnecting │◄──────────────
//!                     └──────────────┘
//!                             │ budget exhausted / disconnect
//!                             ▼
//!                         ┌────────┐
//!                         │ Closed │
//!                         └────────┘
//! ```
//!
//! # Staleness
//!
//! Timers are keyed by an [`Epoch`] that advances on every transition that
//! arms or invalidates a timer, so a timer that fires late is a no-op.
//! Signals carry the [`HandleId`] of their transport handle; signals from a
//! handle the machine no longer owns are ignored.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::{
    config::ConnectionOptions,
    dispatch::Notification,
    error::{EventSourceError, EventSourceResult},
    retry::RetryDecision,
    transport::HandleId,
    types::{ConnectionState, Signal, StreamEvent},
};

/// Timer generation. A timer armed under an older epoch is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Epoch(pub u64);

/// The two kinds of scheduled transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Establishment timeout, armed on entering `Connecting`.
    Timeout,
    /// Reconnect delay, armed on entering `Reconnecting`.
    Retry,
}

/// Work the driver performs on behalf of the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open a transport connection for `handle`.
    OpenTransport {
        /// Identity the new handle's signals will carry.
        handle: HandleId,
        /// Merged options for this attempt.
        options: ConnectionOptions,
    },
    /// Close the transport connection owned under `handle`.
    CloseTransport {
        /// Handle to close.
        handle: HandleId,
    },
    /// Schedule a timer input after `after`.
    ArmTimer {
        /// Which transition the timer triggers.
        kind: TimerKind,
        /// Epoch the timer belongs to.
        epoch: Epoch,
        /// Delay before the timer fires.
        after: Duration,
    },
    /// Cancel every pending timer.
    CancelTimers,
    /// Publish a notification to the dispatch bus.
    Dispatch(Notification),
    /// Hand an inbound event to the message callback and listeners.
    Deliver(StreamEvent),
}

/// Connection state machine.
///
/// Owns the [`ConnectionState`], the retry counter and the identity of the
/// single transport handle.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    options: ConnectionOptions,
    retry_count: u32,
    epoch: Epoch,
    handle: Option<HandleId>,
    next_handle: u64,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMachine {
    /// Create a machine in the `Idle` state.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            options: ConnectionOptions::default(),
            retry_count: 0,
            epoch: Epoch(0),
            handle: None,
            next_handle: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current retry counter.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Current timer epoch.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// The transport handle the machine currently owns.
    pub fn current_handle(&self) -> Option<HandleId> {
        self.handle
    }

    /// Options of the current connection chain.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Start connecting with `options`.
    ///
    /// Any existing handle and pending timers are released first. An explicit
    /// connect starts a new chain with the full retry budget.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, without changing anything, if the
    /// options are invalid (e.g. the endpoint is empty).
    pub fn connect(&mut self, options: ConnectionOptions) -> EventSourceResult<Vec<Action>> {
        options.validate().map_err(EventSourceError::config)?;

        let mut actions = Vec::new();
        self.release(&mut actions);
        self.options = options;
        self.retry_count = 0;
        self.open(&mut actions);
        Ok(actions)
    }

    /// Stop the connection from any state.
    ///
    /// No-op in `Idle` and `Closed`. Does not reset the retry counter.
    pub fn disconnect(&mut self) -> Vec<Action> {
        if matches!(self.state, ConnectionState::Idle | ConnectionState::Closed) {
            return Vec::new();
        }

        let mut actions = Vec::new();
        self.release(&mut actions);
        self.state = ConnectionState::Closed;
        info!(endpoint = %self.options.endpoint, "Event stream closed (requested)");
        actions
    }

    /// Validate a send attempt.
    ///
    /// The connection is server-to-client only, so nothing is written; an
    /// accepted send only produces an audit notification.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::NotConnected`] unless the state is `Open`.
    pub fn send_message(
        &self,
        data: &str,
        event_type: Option<&str>,
    ) -> EventSourceResult<Vec<Action>> {
        if !self.state.is_open() {
            return Err(EventSourceError::NotConnected);
        }
        Ok(vec![Action::Dispatch(Notification::send(data, event_type))])
    }

    /// Feed a signal from transport handle `handle`.
    pub fn on_signal(&mut self, handle: HandleId, signal: Signal) -> Vec<Action> {
        if self.handle != Some(handle) {
            debug!(
                handle = handle.0,
                signal = signal.name(),
                "Ignoring signal from stale transport handle"
            );
            return Vec::new();
        }

        let mut actions = Vec::new();
        match (self.state, signal) {
            (ConnectionState::Connecting, Signal::Open) => {
                info!(endpoint = %self.options.endpoint, "Event stream connection established");
                self.state = ConnectionState::Open;
                self.retry_count = 0;
                self.next_epoch();
                actions.push(Action::CancelTimers);
                actions.push(Action::Dispatch(Notification::open(&self.options.endpoint)));
            }
            (ConnectionState::Open, Signal::Message(event)) => {
                debug!(
                    event_type = %event.event_type,
                    id = ?event.id,
                    "Event received",
                );
                let notification = Notification::message(&event);
                actions.push(Action::Deliver(event));
                actions.push(Action::Dispatch(notification));
            }
            (ConnectionState::Connecting | ConnectionState::Open, Signal::Error(reason)) => {
                self.fail(&EventSourceError::transport(reason), &mut actions);
            }
            (state, signal) => {
                warn!(%state, signal = signal.name(), "Ignoring unexpected signal");
            }
        }
        actions
    }

    /// Feed a timer expiry armed under `epoch`.
    pub fn on_timer(&mut self, kind: TimerKind, epoch: Epoch) -> Vec<Action> {
        if epoch != self.epoch {
            debug!(?kind, epoch = epoch.0, "Ignoring stale timer");
            return Vec::new();
        }

        let mut actions = Vec::new();
        match (kind, self.state) {
            (TimerKind::Timeout, ConnectionState::Connecting) => {
                let timeout = self.options.timeout;
                warn!(endpoint = %self.options.endpoint, ?timeout, "Event stream connect timed out");
                self.fail(&EventSourceError::timeout(timeout), &mut actions);
            }
            (TimerKind::Retry, ConnectionState::Reconnecting) => {
                self.open(&mut actions);
            }
            (kind, state) => {
                debug!(?kind, %state, "Timer fired in unexpected state");
            }
        }
        actions
    }

    /// Feed a failure raised while creating the transport for `handle`.
    ///
    /// Retryable failures take the normal error path. Anything else (an
    /// endpoint the transport cannot use) is dispatched and closes the
    /// connection without retrying.
    pub fn on_open_failed(&mut self, handle: HandleId, err: &EventSourceError) -> Vec<Action> {
        if self.handle != Some(handle) || self.state != ConnectionState::Connecting {
            debug!(handle = handle.0, error = %err, "Ignoring open failure from stale handle");
            return Vec::new();
        }

        let mut actions = Vec::new();
        if err.is_retryable() {
            self.fail(err, &mut actions);
        } else {
            error!(endpoint = %self.options.endpoint, error = %err, "Event stream cannot connect");
            self.release(&mut actions);
            actions.push(Action::Dispatch(Notification::error(err, self.retry_count)));
            self.state = ConnectionState::Closed;
        }
        actions
    }

    /// Enter `Connecting` with a fresh handle and timeout timer.
    fn open(&mut self, actions: &mut Vec<Action>) {
        let handle = HandleId(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.handle = Some(handle);
        self.state = ConnectionState::Connecting;
        let epoch = self.next_epoch();

        info!(
            endpoint = %self.options.endpoint,
            attempt = self.retry_count,
            handle = handle.0,
            "Event stream connecting"
        );
        actions.push(Action::OpenTransport {
            handle,
            options: self.options.clone(),
        });
        actions.push(Action::ArmTimer {
            kind: TimerKind::Timeout,
            epoch,
            after: self.options.timeout,
        });
    }

    /// Tear down after a transport error or timeout and apply the retry policy.
    fn fail(&mut self, err: &EventSourceError, actions: &mut Vec<Action>) {
        error!(endpoint = %self.options.endpoint, error = %err, "Event stream connection failed");
        self.release(actions);
        actions.push(Action::Dispatch(Notification::error(err, self.retry_count)));

        match self.options.retry_policy().decide(self.retry_count) {
            RetryDecision::Retry { attempt, delay } => {
                self.retry_count = attempt;
                self.state = ConnectionState::Reconnecting;
                warn!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Event stream reconnecting after delay"
                );
                actions.push(Action::ArmTimer {
                    kind: TimerKind::Retry,
                    epoch: self.epoch,
                    after: delay,
                });
            }
            RetryDecision::GiveUp => {
                self.state = ConnectionState::Closed;
                error!(
                    attempts = self.options.max_retries,
                    "Max event stream reconnect attempts exceeded"
                );
            }
        }
    }

    /// Close the owned handle, cancel timers and stale the current epoch.
    fn release(&mut self, actions: &mut Vec<Action>) {
        if let Some(handle) = self.handle.take() {
            actions.push(Action::CloseTransport { handle });
        }
        actions.push(Action::CancelTimers);
        self.next_epoch();
    }

    fn next_epoch(&mut self) -> Epoch {
        self.epoch = Epoch(self.epoch.0.wrapping_add(1));
        self.epoch
    }
}
