//! Listener registry for connection lifecycle events.
//!
//! A deliberately small, synchronous publish-subscribe surface scoped to one
//! [`crate::connection::ConnectionManager`]: an explicit mapping from event
//! kind to an ordered list of callbacks. Listeners run in registration
//! order; a panicking listener is caught and logged and does not stop the
//! remaining listeners for the same emission.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use uuid::Uuid;

use crate::connection::ConnectionState;
use crate::error::Kind;
use crate::types::{CloseEvent, WsMessage};

/// Handle returned by [`EventBus::on`], used to unsubscribe.
pub type ListenerId = Uuid;

/// Names of the events a connection manager emits.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The socket finished opening.
    Open,
    /// The socket closed, locally or remotely.
    Close,
    /// A non-fatal runtime failure (transport error, unparseable frame).
    Error,
    /// A decoded inbound frame.
    Message,
    /// The connection state changed to a different value.
    StateChange,
}

/// Payload delivered with an `error` event.
///
/// Runtime failures are reported here instead of being raised; the
/// consuming application decides whether to disconnect.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// Classification matching the crate error taxonomy.
    pub kind: Kind,
    pub message: String,
    /// Raw frame text for parse failures, kept for diagnosability.
    pub payload: Option<String>,
}

/// One emitted event with its payload.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Event {
    Open,
    Close(CloseEvent),
    Error(ErrorEvent),
    Message(WsMessage),
    StateChange(ConnectionState),
}

impl Event {
    /// The registry key this event dispatches under.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Close(_) => EventKind::Close,
            Self::Error(_) => EventKind::Error,
            Self::Message(_) => EventKind::Message,
            Self::StateChange(_) => EventKind::StateChange,
        }
    }
}

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

struct ListenerEntry {
    id: ListenerId,
    listener: Listener,
}

/// Event name to ordered callback list.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<EventKind, Vec<ListenerEntry>>>,
}

impl EventBus {
    /// Register `listener` for `kind`. Listeners fire in registration order.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(ListenerEntry {
                id,
                listener: Arc::new(listener),
            });
        id
    }

    /// Remove a listener. Returns whether anything was removed.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before != entries.len()
    }

    /// Synchronously invoke every listener registered for the event's kind.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe or
    /// unsubscribe from within a callback without deadlocking.
    pub fn emit(&self, event: &Event) {
        let snapshot: Vec<Listener> = {
            let listeners = self
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match listeners.get(&event.kind()) {
                Some(entries) => entries
                    .iter()
                    .map(|entry| Arc::clone(&entry.listener))
                    .collect(),
                None => return,
            }
        };

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!(kind = ?event.kind(), "event listener panicked");
            }
        }
    }
}
