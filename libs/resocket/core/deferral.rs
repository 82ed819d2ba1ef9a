//! Inbound deferral buffer
//!
//! While deferral is on, parsed messages are parked here instead of being
//! delivered. `KeepAll` keeps every message in arrival order; `KeepLast`
//! keeps the latest message per kind, with kinds ordered by first arrival.

use crate::config::DeferStrategy;
use crate::traits::FeedMessage;

#[derive(Debug)]
pub enum DeferralBuffer {
    KeepAll(Vec<FeedMessage>),
    KeepLast(Vec<(String, FeedMessage)>),
}

impl DeferralBuffer {
    pub fn new(strategy: DeferStrategy) -> Self {
        match strategy {
            DeferStrategy::KeepAll => DeferralBuffer::KeepAll(Vec::new()),
            DeferStrategy::KeepLast => DeferralBuffer::KeepLast(Vec::new()),
        }
    }

    pub fn push(&mut self, message: FeedMessage) {
        match self {
            DeferralBuffer::KeepAll(messages) => messages.push(message),
            DeferralBuffer::KeepLast(latest) => {
                match latest.iter_mut().find(|(kind, _)| *kind == message.kind) {
                    Some((_, slot)) => *slot = message,
                    None => latest.push((message.kind.clone(), message)),
                }
            }
        }
    }

    /// Take everything buffered, leaving the buffer empty
    pub fn take(&mut self) -> Vec<FeedMessage> {
        match self {
            DeferralBuffer::KeepAll(messages) => std::mem::take(messages),
            DeferralBuffer::KeepLast(latest) => std::mem::take(latest)
                .into_iter()
                .map(|(_, message)| message)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DeferralBuffer::KeepAll(messages) => messages.len(),
            DeferralBuffer::KeepLast(latest) => latest.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
