//! # Core
//!
//! The connection engine and its building blocks:
//!
//! - **scheduler**: transport ownership, backoff, timeouts and the attempt lock
//! - **connection**: readiness derivation, deferral, idle watchdog, subscriptions
//! - **client**: the handle and the engine task loop
//! - **tungstenite**: the default tokio-tungstenite transport
//! - **batcher**: debounced batching handler on a dedicated thread

pub mod batcher;
pub mod builder;
pub mod client;
pub mod config;
pub mod connection;
pub mod deferral;
pub mod dispatcher;
pub mod queue;
pub mod scheduler;
pub mod tungstenite;

#[cfg(test)]
pub(crate) mod mock;

// Re-export main types
pub use batcher::{DebouncedBatcher, DEFAULT_BATCH_WINDOW};
pub use builder::{states, ResilientClientBuilder};
pub use client::{Metrics, ResilientClient, Snapshot};
pub use config::{ConnectionOptions, DeferStrategy, RetryPolicy};
pub use connection::{Connection, HostEvent};
pub use dispatcher::{EventDispatcher, EventKind, Listener, ListenerId, SocketEvent};
pub use scheduler::ReconnectingSocket;
pub use tungstenite::{TungsteniteConnector, TungsteniteTransport};
