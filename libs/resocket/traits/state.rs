use crate::transport::TransportState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Consumer-facing readiness of a connection
///
/// The first four variants mirror the raw transport state. `Muted` and
/// `Idle` refine `Connected`:
/// - `Muted`: the socket is open but nothing has been received on it yet
/// - `Idle`: the message watchdog saw no traffic within the idle window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Connected = 1,
    Closing = 2,
    Closed = 3,
    Muted = 4,
    Idle = 5,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Connected,
            2 => ConnectionState::Closing,
            4 => ConnectionState::Muted,
            5 => ConnectionState::Idle,
            _ => ConnectionState::Closed,
        }
    }

    /// Any of the open variants
    pub fn is_live(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Muted | ConnectionState::Idle
        )
    }
}

impl From<TransportState> for ConnectionState {
    fn from(state: TransportState) -> Self {
        match state {
            TransportState::Connecting => ConnectionState::Connecting,
            TransportState::Open => ConnectionState::Connected,
            TransportState::Closing => ConnectionState::Closing,
            TransportState::Closed => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Closing => "Closing",
            ConnectionState::Closed => "Closed",
            ConnectionState::Muted => "Muted",
            ConnectionState::Idle => "Idle",
        };
        f.write_str(label)
    }
}

/// Lock-free connection state for reads from outside the engine task
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.get().is_live()
    }
}

/// Readiness notification sent to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyStateEvent {
    #[serde(rename = "id")]
    pub connection_id: String,
    pub state: ConnectionState,
    pub retry_count: u32,
    pub max_retries: Option<u32>,
}
