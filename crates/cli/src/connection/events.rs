// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection states, events and subscriber callbacks.
//!
//! Subscribers register an [`EventHandlers`] value with only the callbacks
//! they care about:
//!
//! ```rust,ignore
//! let handlers = EventHandlers::new()
//!     .on_message(|text| println!("push: {text}"))
//!     .on_state_change(|from, to| println!("{from} -> {to}"))
//!     .on_max_attempts(|attempts| eprintln!("gave up after {attempts}"));
//! let subscription = manager.on_message("tables", handlers)?;
//! ```
//!
//! Every occurrence is a [`ConnectionEvent`]; [`EventHandlers::dispatch`]
//! routes it to the matching slot.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;

use crate::lock;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Error,
    Reconnecting,
    /// Terminal: only a new `create_connection` revives the name.
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Error => "error",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }

    /// True once reconnection gave up.
    pub fn is_terminal(&self) -> bool {
        *self == ConnectionState::Failed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The channel opened (initially or after a reconnect).
    Open,
    /// An application frame arrived. Control frames are never delivered.
    Message(String),
    /// The channel closed.
    Closed { code: Option<u16>, reason: String },
    /// The channel failed to open or broke.
    Error(String),
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// Reconnection gave up; the connection is now `Failed`.
    MaxReconnectAttemptsReached { attempts: u32 },
    /// The outbound queue overflowed and its oldest message was dropped.
    QueueFull { capacity: usize, dropped: String },
}

/// Options for [`send`](super::ConnectionManager::send).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Queue the message when the connection is not open (default: true).
    pub queue_if_disconnected: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        SendOptions {
            queue_if_disconnected: true,
        }
    }
}

impl SendOptions {
    /// Fail with `NotConnected` instead of queueing.
    pub fn no_queue() -> Self {
        SendOptions {
            queue_if_disconnected: false,
        }
    }
}

/// Point-in-time view of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub name: String,
    pub url: String,
    pub state: ConnectionState,
    /// Reconnect attempts since the channel was last open.
    pub attempts: u32,
    /// Outbound messages waiting for the channel to open.
    pub queued: usize,
    /// Messages dropped from the outbound queue on overflow.
    pub dropped: u64,
    /// Last frame sent or received, in milliseconds since Unix epoch.
    pub last_activity: Option<u64>,
    pub subscribers: usize,
}

type Callback0 = Box<dyn Fn() + Send + Sync>;
type TextCallback = Box<dyn Fn(&str) + Send + Sync>;
type CloseCallback = Box<dyn Fn(Option<u16>, &str) + Send + Sync>;
type StateCallback = Box<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;
type CountCallback = Box<dyn Fn(u32) + Send + Sync>;
type QueueFullCallback = Box<dyn Fn(usize, &str) + Send + Sync>;
type AnyCallback = Box<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Typed subscriber callbacks. All slots are optional.
#[derive(Default)]
pub struct EventHandlers {
    on_open: Option<Callback0>,
    on_message: Option<TextCallback>,
    on_close: Option<CloseCallback>,
    on_error: Option<TextCallback>,
    on_state_change: Option<StateCallback>,
    on_max_attempts: Option<CountCallback>,
    on_queue_full: Option<QueueFullCallback>,
    on_event: Option<AnyCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_open", &self.on_open.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_state_change", &self.on_state_change.is_some())
            .field("on_max_attempts", &self.on_max_attempts.is_some())
            .field("on_queue_full", &self.on_queue_full.is_some())
            .field("on_event", &self.on_event.is_some())
            .finish()
    }
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Box::new(f));
        self
    }

    pub fn on_message(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    /// Called with the close code (if any) and reason.
    pub fn on_close(mut self, f: impl Fn(Option<u16>, &str) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Called with the previous and new state.
    pub fn on_state_change(
        mut self,
        f: impl Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    ) -> Self {
        self.on_state_change = Some(Box::new(f));
        self
    }

    pub fn on_max_attempts(mut self, f: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_max_attempts = Some(Box::new(f));
        self
    }

    /// Called with the queue capacity and the dropped message.
    pub fn on_queue_full(mut self, f: impl Fn(usize, &str) + Send + Sync + 'static) -> Self {
        self.on_queue_full = Some(Box::new(f));
        self
    }

    /// Called for every event, after the typed slot.
    pub fn on_event(mut self, f: impl Fn(&ConnectionEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Box::new(f));
        self
    }

    /// Routes an event to its slot, then to the catch-all.
    pub fn dispatch(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Open => {
                if let Some(f) = &self.on_open {
                    f();
                }
            }
            ConnectionEvent::Message(text) => {
                if let Some(f) = &self.on_message {
                    f(text);
                }
            }
            ConnectionEvent::Closed { code, reason } => {
                if let Some(f) = &self.on_close {
                    f(*code, reason);
                }
            }
            ConnectionEvent::Error(message) => {
                if let Some(f) = &self.on_error {
                    f(message);
                }
            }
            ConnectionEvent::StateChanged { from, to } => {
                if let Some(f) = &self.on_state_change {
                    f(*from, *to);
                }
            }
            ConnectionEvent::MaxReconnectAttemptsReached { attempts } => {
                if let Some(f) = &self.on_max_attempts {
                    f(*attempts);
                }
            }
            ConnectionEvent::QueueFull { capacity, dropped } => {
                if let Some(f) = &self.on_queue_full {
                    f(*capacity, dropped);
                }
            }
        }
        if let Some(f) = &self.on_event {
            f(event);
        }
    }
}

/// Subscribers of one connection.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, Arc<EventHandlers>)>>,
}

impl HandlerRegistry {
    pub(crate) fn register(self: &Arc<Self>, handlers: EventHandlers) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.handlers).push((id, Arc::new(handlers)));
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.handlers).len()
    }

    fn unregister(&self, id: u64) {
        lock(&self.handlers).retain(|(h, _)| *h != id);
    }

    /// Delivers `event` to every subscriber. Callbacks run outside the lock.
    pub(crate) fn emit(&self, event: &ConnectionEvent) {
        let handlers: Vec<Arc<EventHandlers>> =
            lock(&self.handlers).iter().map(|(_, h)| Arc::clone(h)).collect();
        for handler in handlers {
            handler.dispatch(event);
        }
    }
}

/// Registration of an [`EventHandlers`] value.
///
/// Dropping the subscription (or calling [`Subscription::cancel`])
/// deregisters the handlers. Use [`Subscription::detach`] to keep them for
/// the life of the connection.
#[must_use = "dropping a Subscription deregisters its handlers"]
pub struct Subscription {
    id: u64,
    registry: Weak<HandlerRegistry>,
}

impl Subscription {
    /// Deregisters the handlers. Cancelling twice is a no-op.
    pub fn cancel(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
        self.registry = Weak::new();
    }

    /// Keeps the handlers registered until the connection is closed.
    pub fn detach(mut self) {
        self.registry = Weak::new();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
