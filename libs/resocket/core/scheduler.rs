//! Reconnection scheduler
//!
//! Owns the current transport and decides when to attempt, retry or give
//! up. Every method is synchronous and runs on the engine task; waiting is
//! expressed as deadlines the engine loop sleeps on, so cancelling a timer
//! is clearing a field.
//!
//! # Attempt sequence
//!
//! ```text
//! connect() ── retry_count += 1 ── wait backoff ── resolve address ──┐
//!                                                                    │
//!         close() requested meanwhile? ── yes ──> abort              │
//!                                       no ───> Connector::connect ──┴─> Init
//!                                                 + connect-timeout watchdog
//! ```
//!
//! On open the uptime timer is armed; if it fires before any close or
//! error, the retry count drops back to 0 so a later drop starts the
//! backoff from scratch.

use crate::config::RetryPolicy;
use crate::dispatcher::SocketEvent;
use crate::queue::OutboundQueue;
use crate::traits::*;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, info, warn};

macro_rules! trace_step {
    ($self:ident, $($arg:tt)*) => {
        if $self.policy.debug {
            debug!(target: "resocket::scheduler", $($arg)*);
        }
    };
}

/// Outcome of an asynchronous address resolution
#[derive(Debug)]
pub struct Resolution {
    pub attempt: u64,
    pub result: Result<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptStage {
    /// Backoff delay running
    Waiting(Instant),
    /// Async address provider in flight
    Resolving,
}

#[derive(Debug, Clone, Copy)]
struct PendingAttempt {
    id: u64,
    stage: AttemptStage,
}

/// Counters exposed through client metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketCounters {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub connect_attempts: u64,
}

pub struct ReconnectingSocket<C: Connector> {
    connector: C,
    address: AddressProvider,
    policy: RetryPolicy,
    strategy: Box<dyn ReconnectionStrategy>,
    protocols: Vec<String>,
    binary_mode: BinaryMode,

    ws: Option<C::Transport>,
    /// Transport whose events are currently accepted
    listening: Option<u64>,
    next_transport_id: u64,
    next_attempt_id: u64,

    retry_count: i64,
    should_reconnect: bool,
    connect_lock: bool,
    close_called: bool,

    pending: Option<PendingAttempt>,
    connect_deadline: Option<Instant>,
    uptime_deadline: Option<Instant>,

    queue: OutboundQueue,
    protocol: String,
    extensions: String,
    counters: SocketCounters,

    events_tx: UnboundedSender<TransportEnvelope>,
    resolved_tx: UnboundedSender<Resolution>,
}

impl<C: Connector> ReconnectingSocket<C> {
    /// Create an idle scheduler. Nothing happens until [`connect`](Self::connect).
    pub fn new(
        connector: C,
        address: AddressProvider,
        policy: RetryPolicy,
        strategy: Box<dyn ReconnectionStrategy>,
        events_tx: UnboundedSender<TransportEnvelope>,
        resolved_tx: UnboundedSender<Resolution>,
    ) -> Self {
        let queue = OutboundQueue::new(policy.max_enqueued_messages);
        let should_reconnect = !policy.start_closed;

        Self {
            connector,
            address,
            strategy,
            protocols: Vec::new(),
            binary_mode: BinaryMode::default(),
            ws: None,
            listening: None,
            next_transport_id: 0,
            next_attempt_id: 0,
            retry_count: -1,
            should_reconnect,
            connect_lock: false,
            close_called: false,
            pending: None,
            connect_deadline: None,
            uptime_deadline: None,
            queue,
            protocol: String::new(),
            extensions: String::new(),
            counters: SocketCounters::default(),
            events_tx,
            resolved_tx,
            policy,
        }
    }

    /// Sub-protocols requested on every attempt
    pub fn with_protocols(mut self, protocols: Vec<String>) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn with_binary_mode(mut self, mode: BinaryMode) -> Self {
        self.binary_mode = mode;
        self
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    /// Raw state of the current transport
    pub fn ready_state(&self) -> TransportState {
        match &self.ws {
            Some(ws) => ws.ready_state(),
            None if self.policy.start_closed => TransportState::Closed,
            None => TransportState::Connecting,
        }
    }

    /// Whether any transport has been created yet
    pub fn has_transport(&self) -> bool {
        self.ws.is_some()
    }

    /// Retries so far, never negative
    pub fn retry_count(&self) -> u32 {
        self.retry_count.max(0) as u32
    }

    /// Internal counter, `-1` before the first attempt
    pub fn raw_retry_count(&self) -> i64 {
        self.retry_count
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.strategy.max_retries()
    }

    pub fn max_retry_limit_reached(&self) -> bool {
        !self.strategy.should_reconnect(self.retry_count)
    }

    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    pub fn close_requested(&self) -> bool {
        self.close_called
    }

    /// Whether an attempt is waiting on backoff or address resolution
    pub fn attempt_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Queued payload estimate plus whatever the transport still holds
    pub fn buffered_amount(&self) -> usize {
        self.queue.buffered_amount() + self.ws.as_ref().map_or(0, |ws| ws.buffered_amount())
    }

    pub fn protocol(&self) -> &str {
        if self.ws.is_some() {
            &self.protocol
        } else {
            ""
        }
    }

    pub fn extensions(&self) -> &str {
        if self.ws.is_some() {
            &self.extensions
        } else {
            ""
        }
    }

    pub fn url(&self) -> &str {
        self.ws.as_ref().map_or("", |ws| ws.url())
    }

    pub fn binary_mode(&self) -> BinaryMode {
        self.binary_mode
    }

    pub fn set_binary_mode(&mut self, mode: BinaryMode) {
        self.binary_mode = mode;
        if let Some(ws) = self.ws.as_mut() {
            ws.set_binary_mode(mode);
        }
    }

    pub fn counters(&self) -> SocketCounters {
        self.counters
    }

    /// Earliest deadline the engine must wake up for
    pub fn next_deadline(&self) -> Option<Instant> {
        let backoff = match self.pending {
            Some(PendingAttempt {
                stage: AttemptStage::Waiting(at),
                ..
            }) => Some(at),
            _ => None,
        };

        [backoff, self.connect_deadline, self.uptime_deadline]
            .into_iter()
            .flatten()
            .min()
    }

    // ---------------------------------------------------------------------
    // Consumer operations
    // ---------------------------------------------------------------------

    /// Forward a payload if the transport is open, queue it otherwise
    pub fn send(&mut self, message: WsMessage) {
        if self.ready_state() == TransportState::Open {
            trace_step!(self, "send {:?}", message);
            self.transmit(message);
        } else if self.queue.push(message) {
            trace_step!(self, "enqueue ({} pending)", self.queue.len());
        } else {
            trace_step!(self, "queue full, dropping payload");
        }
    }

    /// Close the transport and stop reconnecting. Idempotent.
    pub fn close(&mut self, code: Option<u16>, reason: Option<&str>) {
        self.close_called = true;
        self.should_reconnect = false;
        self.clear_timeouts();
        self.cancel_pending();

        let Some(ws) = self.ws.as_ref() else {
            trace_step!(self, "close enqueued: no ws instance");
            return;
        };
        if ws.ready_state() == TransportState::Closed {
            trace_step!(self, "close: already closed");
            return;
        }
        self.disconnect(code.unwrap_or(CLOSE_NORMAL), reason.unwrap_or(""));
    }

    /// Drop the current transport (if any) and start a fresh cycle
    pub fn reconnect(&mut self, code: Option<u16>, reason: Option<&str>) {
        self.should_reconnect = true;
        self.close_called = false;
        self.retry_count = -1;
        self.cancel_pending();

        let closed = self
            .ws
            .as_ref()
            .map_or(true, |ws| ws.ready_state() == TransportState::Closed);
        if !closed {
            self.disconnect(code.unwrap_or(CLOSE_NORMAL), reason.unwrap_or(""));
        }
        self.connect();
    }

    /// Hidden: suspend reconnection without touching the transport.
    /// Visible: resume, reconnecting if forced or if the transport is down.
    pub fn on_visibility_change(&mut self, visible: bool, forced_reconnect: bool) {
        if !visible {
            trace_step!(self, "hidden: reconnection suspended");
            self.should_reconnect = false;
            return;
        }

        if self.close_called {
            return;
        }
        self.should_reconnect = true;

        let down = self
            .ws
            .as_ref()
            .is_some_and(|ws| ws.ready_state().is_closing_or_closed());
        if forced_reconnect || down {
            trace_step!(self, "visible: reconnecting (forced: {})", forced_reconnect);
            self.reconnect(None, None);
        }
    }

    // ---------------------------------------------------------------------
    // Attempt sequence
    // ---------------------------------------------------------------------

    /// Schedule the next attempt, honouring the lock and retry limit
    pub fn connect(&mut self) {
        if self.connect_lock || !self.should_reconnect {
            return;
        }
        self.connect_lock = true;

        if !self.strategy.should_reconnect(self.retry_count) {
            trace_step!(
                self,
                "max retries reached {} >= {:?}",
                self.retry_count,
                self.strategy.max_retries()
            );
            self.connect_lock = false;
            return;
        }

        self.retry_count += 1;
        self.listening = None;

        let delay = self.strategy.next_delay(self.retry_count);
        trace_step!(self, "connect {} (next delay {:?})", self.retry_count, delay);

        self.next_attempt_id += 1;
        self.pending = Some(PendingAttempt {
            id: self.next_attempt_id,
            stage: AttemptStage::Waiting(Instant::now() + delay),
        });
    }

    /// Run every timer that is due at `now`
    pub fn fire_due(&mut self, now: Instant) -> Vec<SocketEvent> {
        let mut out = Vec::new();

        if let Some(PendingAttempt {
            id,
            stage: AttemptStage::Waiting(at),
        }) = self.pending
        {
            if at <= now {
                self.begin_resolution(id, &mut out);
            }
        }

        if self.connect_deadline.is_some_and(|at| at <= now) {
            self.connect_deadline = None;
            trace_step!(self, "timeout event");
            self.handle_error(ErrorEvent::timeout(), &mut out);
        }

        if self.uptime_deadline.is_some_and(|at| at <= now) {
            self.uptime_deadline = None;
            trace_step!(self, "accept open");
            self.retry_count = 0;
        }

        out
    }

    /// Result of an async address resolution
    pub fn on_resolved(&mut self, resolution: Resolution) -> Vec<SocketEvent> {
        let mut out = Vec::new();
        self.finish_attempt(resolution.attempt, resolution.result, &mut out);
        out
    }

    fn begin_resolution(&mut self, id: u64, out: &mut Vec<SocketEvent>) {
        if let Some(result) = self.address.resolve_now() {
            self.finish_attempt(id, result, out);
            return;
        }

        self.pending = Some(PendingAttempt {
            id,
            stage: AttemptStage::Resolving,
        });

        let address = self.address.clone();
        let tx = self.resolved_tx.clone();
        tokio::spawn(async move {
            let result = address.resolve().await;
            let _ = tx.send(Resolution {
                attempt: id,
                result,
            });
        });
    }

    fn finish_attempt(&mut self, id: u64, result: Result<String>, out: &mut Vec<SocketEvent>) {
        if self.pending.map(|p| p.id) != Some(id) {
            trace_step!(self, "discarding stale attempt {}", id);
            return;
        }
        self.pending = None;

        // close() may have landed while we were waiting
        if self.close_called {
            trace_step!(self, "close requested before transport creation");
            self.connect_lock = false;
            return;
        }

        let url = match result {
            Ok(url) => url,
            Err(e) => {
                warn!("Address resolution failed: {}", e);
                self.connect_lock = false;
                out.push(SocketEvent::Error(ErrorEvent::new(e.to_string())));
                self.connect();
                return;
            }
        };

        self.next_transport_id += 1;
        let transport_id = self.next_transport_id;
        let request = ConnectRequest {
            url: url.clone(),
            protocols: self.protocols.clone(),
            binary_mode: self.binary_mode,
        };
        trace_step!(self, "connect {{ url: {}, protocols: {:?} }}", url, self.protocols);

        let sink = EventSink::new(transport_id, self.events_tx.clone());
        self.counters.connect_attempts += 1;

        match self.connector.connect(request, sink) {
            Ok(ws) => {
                info!("Connecting to {} (attempt {})", url, self.retry_count + 1);
                self.ws = Some(ws);
                self.protocol.clear();
                self.extensions.clear();
                self.listening = Some(transport_id);
                self.connect_lock = false;
                out.push(SocketEvent::Init);
                self.connect_deadline = Some(Instant::now() + self.policy.connection_timeout());
            }
            Err(e) => {
                warn!("Failed to create transport for {}: {}", url, e);
                self.connect_lock = false;
                out.push(SocketEvent::Error(ErrorEvent::new(e.to_string())));
                self.connect();
            }
        }
    }

    // ---------------------------------------------------------------------
    // Transport events
    // ---------------------------------------------------------------------

    /// Apply a transport event.
    ///
    /// `preamble` is sent right after an open, ahead of the queued payloads.
    /// Events from transports no longer listened to are dropped.
    pub fn on_transport_event(
        &mut self,
        envelope: TransportEnvelope,
        preamble: &[WsMessage],
    ) -> Vec<SocketEvent> {
        let mut out = Vec::new();

        if self.listening != Some(envelope.transport_id) {
            trace_step!(self, "ignoring event from transport {}", envelope.transport_id);
            return out;
        }

        match envelope.event {
            TransportEvent::Open {
                protocol,
                extensions,
            } => {
                trace_step!(self, "open event");
                self.connect_deadline = None;
                self.uptime_deadline = Some(Instant::now() + self.policy.min_uptime());
                self.protocol = protocol;
                self.extensions = extensions;

                for message in preamble {
                    self.transmit(message.clone());
                }
                let queued: Vec<WsMessage> = self.queue.drain().collect();
                for message in queued {
                    self.transmit(message);
                }

                out.push(SocketEvent::Open);
            }
            TransportEvent::Message(message) => {
                trace_step!(self, "message event");
                self.counters.messages_received += 1;
                out.push(SocketEvent::Message(message));
            }
            TransportEvent::Error(error) => {
                trace_step!(self, "error event {}", error.message);
                self.handle_error(error, &mut out);
            }
            TransportEvent::Close(close) => {
                trace_step!(self, "close event {}", close.code);
                self.clear_timeouts();
                if self.should_reconnect {
                    self.connect();
                } else {
                    self.listening = None;
                }
                out.push(SocketEvent::Close(close));
            }
        }

        out
    }

    fn handle_error(&mut self, error: ErrorEvent, out: &mut Vec<SocketEvent>) {
        let reason = if error.is_timeout() { "timeout" } else { "" };
        self.disconnect(CLOSE_NORMAL, reason);
        out.push(SocketEvent::Error(error));
        self.connect();
    }

    fn disconnect(&mut self, code: u16, reason: &str) {
        self.clear_timeouts();
        if let Some(ws) = self.ws.as_mut() {
            ws.close(code, reason);
        }
    }

    fn transmit(&mut self, message: WsMessage) {
        let Some(ws) = self.ws.as_mut() else {
            return;
        };
        match ws.send(message) {
            Ok(()) => self.counters.messages_sent += 1,
            Err(e) => warn!("Failed to send payload: {}", e),
        }
    }

    fn cancel_pending(&mut self) {
        if self.pending.take().is_some() {
            trace_step!(self, "pending attempt cancelled");
        }
        self.connect_lock = false;
    }

    fn clear_timeouts(&mut self) {
        self.connect_deadline = None;
        self.uptime_deadline = None;
    }
}
