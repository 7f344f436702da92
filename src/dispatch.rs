//! Message routing: per-type handlers with filter, priority, and once
//! semantics.
//!
//! The dispatcher consumes decoded [`WsMessage`] frames (usually by
//! attaching to a manager's `message` events) and routes each one to the
//! handlers registered for its `type`. Higher-priority handlers run first;
//! registration order breaks ties.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use crate::connection::ConnectionManager;
use crate::events::{Event, EventKind, ListenerId};
use crate::types::WsMessage;

/// Handle returned by [`MessageDispatcher::register`], used to unregister.
pub type HandlerId = Uuid;

type Handler = Arc<dyn Fn(&WsMessage) + Send + Sync>;
type Filter = Arc<dyn Fn(&WsMessage) -> bool + Send + Sync>;

/// Delivery options for one registered handler.
#[derive(Default)]
pub struct HandlerOptions {
    priority: i32,
    once: bool,
    filter: Option<Filter>,
}

impl HandlerOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Higher priorities run first. Defaults to 0.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Remove the handler after its first delivery.
    #[must_use]
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Predicate gating delivery. A message rejected by the filter does not
    /// consume a `once` handler.
    #[must_use]
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&WsMessage) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

struct HandlerEntry {
    id: HandlerId,
    /// Registration sequence, breaks priority ties
    seq: u64,
    priority: i32,
    once: bool,
    filter: Option<Filter>,
    handler: Handler,
}

/// Routes messages to handlers registered per message type.
#[derive(Default)]
pub struct MessageDispatcher {
    handlers: DashMap<String, Vec<HandlerEntry>>,
    next_seq: AtomicU64,
}

impl MessageDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for messages of `msg_type`.
    pub fn register<T, F>(&self, msg_type: T, options: HandlerOptions, handler: F) -> HandlerId
    where
        T: Into<String>,
        F: Fn(&WsMessage) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let entry = HandlerEntry {
            id,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            priority: options.priority,
            once: options.once,
            filter: options.filter,
            handler: Arc::new(handler),
        };

        let mut entries = self.handlers.entry(msg_type.into()).or_default();
        entries.push(entry);
        entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        id
    }

    /// Remove a handler. Returns whether anything was removed.
    pub fn unregister(&self, msg_type: &str, id: HandlerId) -> bool {
        let Some(mut entries) = self.handlers.get_mut(msg_type) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before != entries.len()
    }

    /// Number of handlers currently registered for `msg_type`.
    #[must_use]
    pub fn handler_count(&self, msg_type: &str) -> usize {
        self.handlers
            .get(msg_type)
            .map_or(0, |entries| entries.len())
    }

    /// Route `message` to the handlers registered for its type, returning
    /// the number of handlers invoked.
    ///
    /// The handler list is snapshotted first so handlers may register or
    /// unregister without deadlocking; filters run outside the registry
    /// lock. A panicking handler is isolated and logged, and still counts
    /// as delivered.
    pub fn dispatch(&self, message: &WsMessage) -> usize {
        let snapshot: Vec<(HandlerId, bool, Option<Filter>, Handler)> = {
            let Some(entries) = self.handlers.get(&message.msg_type) else {
                return 0;
            };
            entries
                .iter()
                .map(|entry| {
                    (
                        entry.id,
                        entry.once,
                        entry.filter.clone(),
                        Arc::clone(&entry.handler),
                    )
                })
                .collect()
        };

        let mut invoked = 0_usize;
        let mut spent = Vec::new();
        for (id, once, filter, handler) in snapshot {
            if let Some(filter) = filter
                && !filter(message)
            {
                continue;
            }

            if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!(msg_type = %message.msg_type, "message handler panicked");
            }
            invoked += 1;
            if once {
                spent.push(id);
            }
        }

        if !spent.is_empty()
            && let Some(mut entries) = self.handlers.get_mut(&message.msg_type)
        {
            entries.retain(|entry| !spent.contains(&entry.id));
        }

        invoked
    }

    /// Wire this dispatcher to a manager's `message` events.
    pub fn attach(self: &Arc<Self>, manager: &ConnectionManager) -> ListenerId {
        let dispatcher = Arc::clone(self);
        manager.on(EventKind::Message, move |event| {
            if let Event::Message(message) = event {
                _ = dispatcher.dispatch(message);
            }
        })
    }
}
