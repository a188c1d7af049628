//! Connection manager: drives a [`ConnectionMachine`] against a real
//! transport, tokio timers and the dispatch bus.
//!
//! # Architecture
//!
//! ```text
//! public call ──► lock ──► machine ──► transport / timer actions (under lock)
//!                                   └► dispatch / deliver        (after unlock)
//!
//! transport ──► SignalSender ──┐
//! timer task ──────────────────┴─► mpsc ──► pump task ──► lock ──► machine ...
//! ```
//!
//! Every input is serialized through one mutex. Notifications, the message
//! callback and listeners run after the lock is released, so they may call
//! back into the client.

use std::{
    collections::VecDeque,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
    task::AbortHandle,
};
use tracing::{debug, error, warn};

use crate::{
    config::{ConnectionOptions, OptionsPatch},
    dispatch::{Dispatcher, Notification},
    error::{EventSourceError, EventSourceResult},
    listener::ListenerRegistry,
    machine::{Action, ConnectionMachine, Epoch, TimerKind},
    transport::{HandleId, SignalSender, Transport, TransportHandle},
    types::{ConnectionState, Signal, StreamEvent},
};

/// Global callback invoked for every inbound event, before the listeners.
pub type MessageCallback = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Inputs delivered to the pump task.
#[derive(Debug)]
pub(crate) enum Input {
    Signal { handle: HandleId, signal: Signal },
    Timer { kind: TimerKind, epoch: Epoch },
}

/// Effects executed after the lock is released.
enum Deferred {
    Dispatch(Notification),
    Deliver(StreamEvent),
}

/// Outcome of executing a batch of actions under the lock.
struct Applied {
    deferred: Vec<Deferred>,
    /// A transport open that failed with a non-retryable error.
    rejected: Option<EventSourceError>,
}

struct Shared {
    machine: ConnectionMachine,
    stored: ConnectionOptions,
    transport: Option<(HandleId, Box<dyn TransportHandle>)>,
    timers: Vec<AbortHandle>,
}

struct Inner {
    shared: Mutex<Shared>,
    transport: Box<dyn Transport>,
    dispatcher: Arc<dyn Dispatcher>,
    listeners: Arc<ListenerRegistry>,
    on_message: RwLock<Option<MessageCallback>>,
    input_tx: mpsc::UnboundedSender<Input>,
    state_tx: watch::Sender<ConnectionState>,
    runtime: Handle,
}

/// Owns one streaming connection at a time and its state machine.
pub struct ConnectionManager {
    inner: Arc<Inner>,
    pump: AbortHandle,
}

impl ConnectionManager {
    /// Create a manager in the `Idle` state.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when called outside a tokio runtime.
    pub fn new<T, D>(
        options: ConnectionOptions,
        transport: T,
        dispatcher: D,
        listeners: Arc<ListenerRegistry>,
    ) -> EventSourceResult<Self>
    where
        T: Transport,
        D: Dispatcher,
    {
        let runtime = Handle::try_current()
            .map_err(|e| EventSourceError::config(format!("No tokio runtime available: {e}")))?;

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Idle);

        let inner = Arc::new(Inner {
            shared: Mutex::new(Shared {
                machine: ConnectionMachine::new(),
                stored: options,
                transport: None,
                timers: Vec::new(),
            }),
            transport: Box::new(transport),
            dispatcher: Arc::new(dispatcher),
            listeners,
            on_message: RwLock::new(None),
            input_tx,
            state_tx,
            runtime,
        });

        let pump = inner
            .runtime
            .spawn(pump(Arc::downgrade(&inner), input_rx))
            .abort_handle();

        Ok(Self { inner, pump })
    }

    /// Merge `patch` into the stored options and start connecting.
    ///
    /// Returns once the transport handle exists; opening is observed through
    /// [`state`](Self::state). The merged options become the stored options.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, without touching the transport, if the
    /// merged endpoint is empty. Returns the transport's error if it refuses
    /// the options outright; the client is `Closed` and no retry is
    /// scheduled in that case.
    pub fn connect(&self, patch: Option<&OptionsPatch>) -> EventSourceResult<()> {
        let applied = {
            let mut shared = self.inner.shared.lock();
            let merged = match patch {
                Some(patch) => shared.stored.merged(patch),
                None => shared.stored.clone(),
            };
            let actions = shared.machine.connect(merged.clone())?;
            shared.stored = merged;
            self.inner.apply(&mut shared, actions)
        };
        self.inner.finish(applied)
    }

    /// Stop the connection and cancel pending timers. Idempotent.
    pub fn disconnect(&self) {
        let applied = {
            let mut shared = self.inner.shared.lock();
            let actions = shared.machine.disconnect();
            self.inner.apply(&mut shared, actions)
        };
        self.inner.run_deferred(applied.deferred);
    }

    /// Disconnect and immediately connect again with the stored options,
    /// without waiting for the retry interval.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the stored endpoint is empty. The
    /// current connection is still torn down, so the client ends up `Closed`,
    /// or stays `Idle` if it never connected. Transport refusals are
    /// reported as in [`connect`](Self::connect).
    pub fn reconnect(&self) -> EventSourceResult<()> {
        let (applied, result) = {
            let mut shared = self.inner.shared.lock();
            let mut actions = shared.machine.disconnect();
            let options = shared.stored.clone();
            let result = shared.machine.connect(options).map(|more| actions.extend(more));
            (self.inner.apply(&mut shared, actions), result)
        };
        result?;
        self.inner.finish(applied)
    }

    /// Record an attempted send on the dispatch bus.
    ///
    /// Nothing is written to the wire.
    ///
    /// # Errors
    ///
    /// Returns [`EventSourceError::NotConnected`] unless the connection is
    /// open; nothing is dispatched in that case.
    pub fn send_message(&self, data: &str, event_type: Option<&str>) -> EventSourceResult<()> {
        let applied = {
            let mut shared = self.inner.shared.lock();
            let actions = shared.machine.send_message(data, event_type)?;
            self.inner.apply(&mut shared, actions)
        };
        self.inner.run_deferred(applied.deferred);
        Ok(())
    }

    /// Merge `patch` into the stored options.
    ///
    /// Takes effect on the next connect or reconnect; an open connection is
    /// not affected.
    pub fn update_options(&self, patch: &OptionsPatch) {
        self.inner.shared.lock().stored.apply(patch);
    }

    /// A copy of the stored options.
    pub fn options(&self) -> ConnectionOptions {
        self.inner.shared.lock().stored.clone()
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().machine.state()
    }

    /// `true` if and only if the state is `Open`.
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Current retry counter.
    pub fn retry_count(&self) -> u32 {
        self.inner.shared.lock().machine.retry_count()
    }

    /// Watch every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Set or clear the global message callback.
    pub fn set_on_message(&self, callback: Option<MessageCallback>) {
        *self.inner.on_message.write() = callback;
    }

    /// The listener registry events are fanned out to.
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.inner.listeners
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.pump.abort();
        let mut shared = self.inner.shared.lock();
        if let Some((_, mut handle)) = shared.transport.take() {
            handle.close();
        }
        for timer in shared.timers.drain(..) {
            timer.abort();
        }
    }
}

impl Inner {
    fn handle_input(&self, input: Input) {
        let applied = {
            let mut shared = self.shared.lock();
            let actions = match input {
                Input::Signal { handle, signal } => shared.machine.on_signal(handle, signal),
                Input::Timer { kind, epoch } => shared.machine.on_timer(kind, epoch),
            };
            self.apply(&mut shared, actions)
        };
        if let Some(err) = applied.rejected {
            debug!(error = %err, "Transport refused to open");
        }
        self.run_deferred(applied.deferred);
    }

    /// Run deferred effects, then surface a refused open as an error.
    fn finish(&self, applied: Applied) -> EventSourceResult<()> {
        self.run_deferred(applied.deferred);
        applied.rejected.map_or(Ok(()), Err)
    }

    /// Execute transport and timer actions; return the rest for later.
    ///
    /// A failed transport open is fed back into the machine in the same
    /// critical section.
    fn apply(&self, shared: &mut Shared, actions: Vec<Action>) -> Applied {
        let mut queue = VecDeque::from(actions);
        let mut deferred = Vec::new();
        let mut rejected = None;
        while let Some(action) = queue.pop_front() {
            match action {
                Action::OpenTransport { handle, options } => {
                    if let Err(err) = self.open_transport(shared, handle, &options) {
                        queue.extend(shared.machine.on_open_failed(handle, &err));
                        if !err.is_retryable() {
                            rejected = Some(err);
                        }
                    }
                }
                Action::CloseTransport { handle } => {
                    if let Some((owned, mut transport)) = shared.transport.take() {
                        debug!(
                            handle = handle.0,
                            owned = owned.0,
                            was_open = transport.is_open(),
                            "Closing transport handle"
                        );
                        transport.close();
                    }
                }
                Action::ArmTimer { kind, epoch, after } => {
                    shared.timers.retain(|timer| !timer.is_finished());
                    shared.timers.push(self.arm_timer(kind, epoch, after));
                }
                Action::CancelTimers => {
                    for timer in shared.timers.drain(..) {
                        timer.abort();
                    }
                }
                Action::Dispatch(notification) => deferred.push(Deferred::Dispatch(notification)),
                Action::Deliver(event) => deferred.push(Deferred::Deliver(event)),
            }
        }
        let state = shared.machine.state();
        self.state_tx
            .send_if_modified(|current| replace_state(current, state));
        Applied { deferred, rejected }
    }

    fn open_transport(
        &self,
        shared: &mut Shared,
        handle: HandleId,
        options: &ConnectionOptions,
    ) -> EventSourceResult<()> {
        if let Some((_, mut previous)) = shared.transport.take() {
            previous.close();
        }

        let signals = SignalSender::new(handle, self.input_tx.clone());
        let _guard = self.runtime.enter();
        let transport = self.transport.open(options, signals).inspect_err(|err| {
            warn!(handle = handle.0, error = %err, "Transport failed to open");
        })?;
        shared.transport = Some((handle, transport));
        Ok(())
    }

    fn arm_timer(&self, kind: TimerKind, epoch: Epoch, after: Duration) -> AbortHandle {
        let input_tx = self.input_tx.clone();
        self.runtime
            .spawn(async move {
                tokio::time::sleep(after).await;
                let _ = input_tx.send(Input::Timer { kind, epoch });
            })
            .abort_handle()
    }

    fn run_deferred(&self, deferred: Vec<Deferred>) {
        for effect in deferred {
            match effect {
                Deferred::Dispatch(notification) => {
                    let kind = notification.kind;
                    let dispatched =
                        catch_unwind(AssertUnwindSafe(|| self.dispatcher.dispatch(notification)));
                    if dispatched.is_err() {
                        error!(%kind, "Dispatcher panicked");
                    }
                }
                Deferred::Deliver(event) => {
                    let callback = self.on_message.read().clone();
                    if let Some(callback) = callback
                        && catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err()
                    {
                        error!(event_type = %event.event_type, "Message callback panicked");
                    }
                    self.listeners.dispatch(&event);
                }
            }
        }
    }
}

fn replace_state(current: &mut ConnectionState, next: ConnectionState) -> bool {
    if *current == next {
        return false;
    }
    *current = next;
    true
}

/// The long-lived background task that serializes transport signals and
/// timer expiries into the machine.
async fn pump(inner: Weak<Inner>, mut input_rx: mpsc::UnboundedReceiver<Input>) {
    while let Some(input) = input_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_input(input);
    }
    debug!("Event stream input pump stopped");
}
