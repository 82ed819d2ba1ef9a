//! # Resocket Traits
//!
//! Core traits and types shared across the resocket crate:
//!
//! - **Transport / Connector**: the socket seam, one transport per attempt
//! - **AddressProvider**: literal, computed or asynchronously resolved URLs
//! - **ReconnectionStrategy**: backoff and retry limits
//! - **MessageHandler**: the consumer's message-handling capability
//! - **ConnectionState**: normalized readiness reported to the host
//!
//! ## Example
//!
//! ```rust,ignore
//! use resocket::traits::*;
//!
//! struct Headlines;
//!
//! impl MessageHandler for Headlines {
//!     fn handle(&mut self, message: FeedMessage) -> Result<()> {
//!         tracing::info!("{} message", message.kind);
//!         Ok(())
//!     }
//! }
//! ```

pub mod address;
pub mod error;
pub mod handler;
pub mod message;
pub mod reconnect;
pub mod state;
pub mod transport;

// Re-export commonly used types
pub use address::{AddressProvider, AsyncAddress};
pub use error::{Result, SocketError};
pub use handler::{MessageHandler, NoOpHandler};
pub use message::{is_empty_payload, FeedMessage, WsMessage, CLOSED_KIND, DEFAULT_KIND};
pub use reconnect::{GrowingBackoff, ReconnectionStrategy};
pub use state::{AtomicConnectionState, ConnectionState, ReadyStateEvent};
pub use transport::{
    AtomicTransportState, BinaryMode, CloseEvent, ConnectRequest, Connector, ErrorEvent,
    EventSink, Transport, TransportEnvelope, TransportEvent, TransportState, CLOSE_ABNORMAL,
    CLOSE_NORMAL,
};
