use crate::error::Result;
use crate::message::FeedMessage;
use crate::state::ReadyStateEvent;
use crate::transport::{CloseEvent, ErrorEvent};

/// Message-handling capability injected into a connection
///
/// The connection parses and (optionally) defers inbound traffic, then
/// hands each message to `handle` in delivery order. The lifecycle hooks
/// default to no-ops.
///
/// All methods run on the connection's engine task. Keep them short; hand
/// heavy work to another thread (see [`DebouncedBatcher`](crate::batcher::DebouncedBatcher)).
///
/// # Example
///
/// ```ignore
/// struct Printer;
///
/// impl MessageHandler for Printer {
///     fn handle(&mut self, message: FeedMessage) -> Result<()> {
///         println!("{}: {:?}", message.kind, message.body);
///         Ok(())
///     }
/// }
/// ```
pub trait MessageHandler: Send + 'static {
    /// Handle a delivered message
    ///
    /// # Errors
    /// Errors are logged; delivery of later messages continues.
    fn handle(&mut self, message: FeedMessage) -> Result<()>;

    /// The transport opened and subscriptions were resent
    fn on_open(&mut self) {}

    /// The transport closed
    fn on_close(&mut self, _event: &CloseEvent) {}

    /// The transport reported an error
    fn on_error(&mut self, _event: &ErrorEvent) {}

    /// A readiness change was emitted to the host
    fn on_state_change(&mut self, _state: &ReadyStateEvent) {}
}

/// A handler that drops every message
pub struct NoOpHandler;

impl MessageHandler for NoOpHandler {
    fn handle(&mut self, _message: FeedMessage) -> Result<()> {
        Ok(())
    }
}
