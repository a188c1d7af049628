//! Per-event-type listener registry using `scc::HashMap`.
//!
//! The registry maps an event type label to a set of [`Listener`]s. It is
//! independent of the connection lifecycle: listeners can be registered
//! before the first connect and survive reconnects.

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use tracing::error;

use crate::types::StreamEvent;

type Callback = dyn Fn(&StreamEvent) + Send + Sync;

/// A subscriber callback.
///
/// Listeners are compared by identity: clones of the same `Listener` are
/// equal, two listeners built from identical closures are not.
#[derive(Clone)]
pub struct Listener(Arc<Callback>);

impl Listener {
    /// Wrap a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    /// Returns `true` if both listeners refer to the same callback.
    pub fn same(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0).cast::<()>(),
            Arc::as_ptr(&other.0).cast::<()>(),
        )
    }

    /// Invoke the callback, containing any panic it raises.
    ///
    /// Returns `false` if the callback panicked.
    pub fn invoke(&self, event: &StreamEvent) -> bool {
        catch_unwind(AssertUnwindSafe(|| (self.0)(event))).is_ok()
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

impl<F> From<F> for Listener
where
    F: Fn(&StreamEvent) + Send + Sync + 'static,
{
    fn from(callback: F) -> Self {
        Self::new(callback)
    }
}

/// Lock-free store of listeners keyed by event type.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: scc::HashMap<String, Vec<Listener>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `event_type`.
    ///
    /// Returns `false` if the same listener was already registered for this
    /// type, in which case nothing changes.
    pub fn add(&self, event_type: impl Into<String>, listener: Listener) -> bool {
        let event_type = event_type.into();

        if let Some(added) = self
            .listeners
            .update_sync(&event_type, |_, list| push_unique(list, &listener))
        {
            return added;
        }

        if let Err((event_type, _)) = self
            .listeners
            .insert_sync(event_type, vec![listener.clone()])
        {
            // Another thread created the entry first.
            return self
                .listeners
                .update_sync(&event_type, |_, list| push_unique(list, &listener))
                .unwrap_or(false);
        }

        true
    }

    /// Remove `listener` from `event_type`.
    ///
    /// Returns `true` if it was registered.
    pub fn remove(&self, event_type: &str, listener: &Listener) -> bool {
        let mut now_empty = false;

        let removed = self
            .listeners
            .update_sync(event_type, |_, list| {
                let before = list.len();
                list.retain(|existing| !existing.same(listener));
                now_empty = list.is_empty();
                list.len() != before
            })
            .unwrap_or(false);

        if now_empty {
            self.listeners
                .remove_if_sync(event_type, |list| list.is_empty());
        }

        removed
    }

    /// Snapshot of the listeners registered for `event_type`.
    pub fn listeners(&self, event_type: &str) -> Vec<Listener> {
        self.listeners
            .update_sync(event_type, |_, list| list.clone())
            .unwrap_or_default()
    }

    /// Invoke every listener registered for the event's type.
    ///
    /// Listeners run on a snapshot, so a callback may add or remove
    /// listeners. A panicking listener is logged and does not prevent the
    /// others from running. Returns the number of listeners invoked.
    pub fn dispatch(&self, event: &StreamEvent) -> usize {
        let listeners = self.listeners(&event.event_type);
        for listener in &listeners {
            if !listener.invoke(event) {
                error!(event_type = %event.event_type, "Event listener panicked");
            }
        }
        listeners.len()
    }

    /// Number of listeners registered for `event_type`.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners
            .update_sync(event_type, |_, list| list.len())
            .unwrap_or(0)
    }

    /// All event types with at least one listener.
    pub fn event_types(&self) -> Vec<String> {
        let mut types = Vec::new();
        self.listeners.retain_sync(|event_type, _| {
            types.push(event_type.clone());
            true
        });
        types
    }

    /// Number of event types with listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Check if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.listeners.clear_sync();
    }
}

fn push_unique(list: &mut Vec<Listener>, listener: &Listener) -> bool {
    if list.iter().any(|existing| existing.same(listener)) {
        return false;
    }
    list.push(listener.clone());
    true
}
