//! Transport seam
//!
//! The scheduler never talks to a socket library directly. It asks a
//! [`Connector`] for one [`Transport`] per connection attempt and receives
//! that transport's lifecycle through an [`EventSink`]:
//!
//! ```text
//! Scheduler ──connect(url)──> Connector ──> Transport (send / close / state)
//!     ▲                                          │
//!     └──────── TransportEnvelope { id, event } ─┘
//! ```
//!
//! Every envelope carries the id of the transport that produced it, which
//! lets the scheduler drop events from transports it has stopped listening to.

use crate::error::Result;
use crate::message::WsMessage;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc::UnboundedSender;

/// Normal closure code
pub const CLOSE_NORMAL: u16 = 1000;

/// Abnormal closure code (no close frame received)
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Raw ready state of a single transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransportState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl TransportState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TransportState::Connecting,
            1 => TransportState::Open,
            2 => TransportState::Closing,
            _ => TransportState::Closed,
        }
    }

    /// Closed or on its way there
    pub fn is_closing_or_closed(self) -> bool {
        matches!(self, TransportState::Closing | TransportState::Closed)
    }
}

/// Lock-free transport state shared between an I/O task and its handle
#[derive(Debug)]
pub struct AtomicTransportState(AtomicU8);

impl AtomicTransportState {
    pub fn new(state: TransportState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn get(&self) -> TransportState {
        TransportState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: TransportState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// How binary frames are surfaced to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryMode {
    /// Deliver binary frames as bytes
    #[default]
    Bytes,
    /// Decode binary frames as UTF-8 text (lossy)
    Text,
}

/// Close notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseEvent {
    pub fn new(code: u16, reason: impl Into<String>, was_clean: bool) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean,
        }
    }
}

/// Error notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub message: String,
}

impl ErrorEvent {
    /// Message used for the synthesized connect-timeout error
    pub const TIMEOUT: &'static str = "TIMEOUT";

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(Self::TIMEOUT)
    }

    pub fn is_timeout(&self) -> bool {
        self.message == Self::TIMEOUT
    }
}

/// Lifecycle event emitted by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake completed; `protocol` and `extensions` are the negotiated values
    Open {
        protocol: String,
        extensions: String,
    },
    Message(WsMessage),
    Error(ErrorEvent),
    Close(CloseEvent),
}

/// An event tagged with the transport that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEnvelope {
    pub transport_id: u64,
    pub event: TransportEvent,
}

/// Where a transport reports its lifecycle
#[derive(Debug, Clone)]
pub struct EventSink {
    transport_id: u64,
    tx: UnboundedSender<TransportEnvelope>,
}

impl EventSink {
    pub fn new(transport_id: u64, tx: UnboundedSender<TransportEnvelope>) -> Self {
        Self { transport_id, tx }
    }

    pub fn transport_id(&self) -> u64 {
        self.transport_id
    }

    /// Forward an event. Returns false once the engine is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TransportEnvelope {
                transport_id: self.transport_id,
                event,
            })
            .is_ok()
    }
}

/// Parameters for a single connection attempt
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub url: String,
    pub protocols: Vec<String>,
    pub binary_mode: BinaryMode,
}

/// One underlying socket-like resource
///
/// Implementations report lifecycle through the [`EventSink`] they were
/// created with; the methods here are the synchronous half.
pub trait Transport: Send + 'static {
    /// Queue a payload for transmission
    fn send(&mut self, message: WsMessage) -> Result<()>;

    /// Start a closing handshake
    fn close(&mut self, code: u16, reason: &str);

    /// Current raw state
    fn ready_state(&self) -> TransportState;

    /// Bytes accepted by `send` but not yet written
    fn buffered_amount(&self) -> usize;

    fn binary_mode(&self) -> BinaryMode;

    fn set_binary_mode(&mut self, mode: BinaryMode);

    /// URL this transport connected to
    fn url(&self) -> &str;
}

/// Factory for transports
pub trait Connector: Send + 'static {
    type Transport: Transport;

    /// Instantiate a transport and begin connecting.
    ///
    /// Must not block; the outcome is reported through `events`.
    fn connect(&mut self, request: ConnectRequest, events: EventSink) -> Result<Self::Transport>;
}
