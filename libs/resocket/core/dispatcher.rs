//! Event fan-out
//!
//! Each event kind has one optional callback slot plus an ordered list of
//! listeners. Dispatch calls the slot first, then the listeners in
//! registration order. A panicking listener is caught and logged so the
//! rest still run.

use crate::traits::*;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Kinds of lifecycle event a consumer can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Init,
    Open,
    Close,
    Message,
    Error,
}

/// Event delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A new transport was instantiated
    Init,
    Open,
    Close(CloseEvent),
    Message(WsMessage),
    Error(ErrorEvent),
}

impl SocketEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SocketEvent::Init => EventKind::Init,
            SocketEvent::Open => EventKind::Open,
            SocketEvent::Close(_) => EventKind::Close,
            SocketEvent::Message(_) => EventKind::Message,
            SocketEvent::Error(_) => EventKind::Error,
        }
    }
}

/// Listener callback
pub type Listener = Box<dyn FnMut(&SocketEvent) + Send>;

/// Handle returned on registration, used for removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

#[derive(Default)]
pub struct EventDispatcher {
    slots: HashMap<EventKind, Listener>,
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the single callback slot for `kind`
    pub fn set_callback(&mut self, kind: EventKind, callback: Option<Listener>) {
        match callback {
            Some(cb) => {
                self.slots.insert(kind, cb);
            }
            None => {
                self.slots.remove(&kind);
            }
        }
    }

    pub fn add_listener(&mut self, kind: EventKind, id: ListenerId, listener: Listener) {
        self.listeners.entry(kind).or_default().push((id, listener));
    }

    /// Returns true if a listener was removed
    pub fn remove_listener(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(list) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        list.len() != before
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    pub fn dispatch(&mut self, event: &SocketEvent) {
        let kind = event.kind();

        if let Some(slot) = self.slots.get_mut(&kind) {
            invoke(slot, event, kind);
        }

        if let Some(list) = self.listeners.get_mut(&kind) {
            for (_, listener) in list.iter_mut() {
                invoke(listener, event, kind);
            }
        }
    }
}

fn invoke(listener: &mut Listener, event: &SocketEvent, kind: EventKind) {
    if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
        error!("Listener for {:?} event panicked", kind);
    }
}
