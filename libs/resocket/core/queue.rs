//! Outbound queue
//!
//! Holds payloads sent while the transport is not open. Capacity is a
//! best-effort bound: once full, new payloads are dropped silently.

use crate::traits::WsMessage;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<WsMessage>,
    capacity: Option<usize>,
}

impl OutboundQueue {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            pending: VecDeque::new(),
            capacity,
        }
    }

    /// Append a payload. Returns false if it was dropped.
    pub fn push(&mut self, message: WsMessage) -> bool {
        if self.capacity.is_some_and(|cap| self.pending.len() >= cap) {
            return false;
        }
        self.pending.push_back(message);
        true
    }

    /// Take every pending payload in enqueue order
    pub fn drain(&mut self) -> impl Iterator<Item = WsMessage> + '_ {
        self.pending.drain(..)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Sum of payload size hints
    pub fn buffered_amount(&self) -> usize {
        self.pending.iter().map(WsMessage::size_hint).sum()
    }
}
