//! # Resocket
//!
//! A resilient WebSocket client: one logical connection that survives
//! drops, timeouts and host visibility changes.
//!
//! ## Features
//!
//! - **Single-owner engine**: all connection state lives in one tokio task
//! - **Growing backoff**: immediate first attempt, capped growth, optional retry limit
//! - **Outbound queue**: sends while disconnected are flushed on open
//! - **Subscriptions**: registered payloads are resent after every reconnect
//! - **Normalized readiness**: Muted and Idle refine the raw socket state
//! - **Type-state builder**: address and handler are required at compile time
//!
//! ## Example
//!
//! ```rust,ignore
//! use resocket::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = resocket::builder()
//!         .url("wss://news.example.com/feed")
//!         .batched(DEFAULT_BATCH_WINDOW)
//!         .subscription("hello", "hello")
//!         .build()
//!         .await?;
//!
//!     while let Ok(event) = client.recv_event() {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     client.shutdown().await
//! }
//! ```

pub mod core;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use crate::core::{
    batcher, builder, client, config, connection, deferral, dispatcher, queue, scheduler,
    tungstenite,
    batcher::{DebouncedBatcher, DEFAULT_BATCH_WINDOW},
    builder::{states, ResilientClientBuilder},
    client::{Metrics, ResilientClient, Snapshot},
    config::{ConnectionOptions, DeferStrategy, RetryPolicy},
    connection::{Connection, HostEvent},
    dispatcher::{EventDispatcher, EventKind, Listener, ListenerId, SocketEvent},
    scheduler::ReconnectingSocket,
    tungstenite::{TungsteniteConnector, TungsteniteTransport},
};

/// Create a new client builder
///
/// # Example
/// ```ignore
/// let client = resocket::builder()
///     .url("wss://news.example.com/feed")
///     .handler(MyHandler)
///     .retry_policy(RetryPolicy { max_retries: Some(9), ..RetryPolicy::default() })
///     .build()
///     .await?;
/// ```
pub fn builder() -> ResilientClientBuilder<
    builder::states::NoAddress,
    builder::states::NoHandler,
    NoOpHandler,
    TungsteniteConnector,
> {
    ResilientClientBuilder::new()
}
