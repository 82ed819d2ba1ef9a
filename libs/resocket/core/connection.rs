//! Connection facade
//!
//! Wraps the reconnection scheduler with consumer-facing behaviour:
//! normalized readiness reporting, inbound parsing and deferral, the idle
//! watchdog, visibility handling and the subscription registry.
//!
//! Readiness is derived from the raw transport state and refined:
//! an open socket that has not received anything yet is `Muted`, and the
//! idle watchdog can report `Idle`. A [`ReadyStateEvent`] is emitted only
//! when the derived state changes.

use crate::client::{Command, Metrics, Snapshot};
use crate::config::ConnectionOptions;
use crate::deferral::DeferralBuffer;
use crate::dispatcher::{EventDispatcher, SocketEvent};
use crate::scheduler::{ReconnectingSocket, Resolution};
use crate::traits::*;
use crossbeam_channel::Sender;
use serde::Serialize;
use std::borrow::Cow;
use std::ops::ControlFlow;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Notification posted to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum HostEvent {
    /// Readiness changed
    #[serde(rename = "WS_READY_STATE")]
    ReadyState(ReadyStateEvent),
    /// A batch of delivered messages
    #[serde(rename = "WS_DATA")]
    Data(Vec<FeedMessage>),
}

pub struct Connection<H: MessageHandler, C: Connector> {
    socket: ReconnectingSocket<C>,
    handler: H,
    options: ConnectionOptions,
    dispatcher: EventDispatcher,
    deferred: DeferralBuffer,
    defer_updates: bool,
    subscriptions: Vec<(String, WsMessage)>,
    last_message_at: Option<Instant>,
    idle_deadline: Option<Instant>,
    page_visible: bool,
    last_emitted: Option<ReadyStateEvent>,
    /// Readiness changes waiting for the next snapshot publish
    outbox: Vec<HostEvent>,
    host_tx: Sender<HostEvent>,
}

impl<H: MessageHandler, C: Connector> Connection<H, C> {
    pub fn new(
        socket: ReconnectingSocket<C>,
        handler: H,
        options: ConnectionOptions,
        host_tx: Sender<HostEvent>,
    ) -> Self {
        Self {
            socket,
            handler,
            deferred: DeferralBuffer::new(options.defer_strategy),
            defer_updates: options.defer_updates,
            options,
            dispatcher: EventDispatcher::new(),
            subscriptions: Vec::new(),
            last_message_at: None,
            idle_deadline: None,
            page_visible: true,
            last_emitted: None,
            outbox: Vec::new(),
            host_tx,
        }
    }

    /// Begin the first attempt.
    ///
    /// When configured to start closed no transport is created and the
    /// host is told `Closed` right away.
    pub fn start(&mut self) {
        self.socket.connect();
        if !self.socket.has_transport() && self.socket.ready_state() == TransportState::Closed {
            self.emit(Some(ConnectionState::Closed));
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn socket(&self) -> &ReconnectingSocket<C> {
        &self.socket
    }

    /// Register (or replace) a subscription payload.
    ///
    /// Registered payloads are sent after every open, ahead of the queue.
    /// If the socket is open right now the payload also goes out immediately.
    pub fn subscribe(&mut self, id: impl Into<String>, payload: WsMessage) {
        let id = id.into();
        if self.socket.ready_state() == TransportState::Open {
            self.socket.send(payload.clone());
        }
        match self.subscriptions.iter_mut().find(|(sid, _)| *sid == id) {
            Some((_, existing)) => *existing = payload,
            None => self.subscriptions.push((id, payload)),
        }
    }

    /// Drop a subscription, optionally sending a farewell payload
    pub fn unsubscribe(&mut self, id: &str, payload: Option<WsMessage>) {
        self.subscriptions.retain(|(sid, _)| sid != id);
        if let Some(payload) = payload {
            self.send(payload);
        }
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.iter().map(|(id, _)| id.as_str())
    }

    // ---------------------------------------------------------------------
    // Engine entry points
    // ---------------------------------------------------------------------

    pub fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Send(message) => self.send(message),
            Command::Close { code, reason } => self.close(code, reason.as_deref()),
            Command::Reconnect { code, reason } => self.reconnect(code, reason.as_deref()),
            Command::SetDeferUpdates(on) => self.set_defer_updates(on),
            Command::SetVisibility(visible) => self.on_visibility_change(visible),
            Command::SetBinaryMode(mode) => self.socket.set_binary_mode(mode),
            Command::Subscribe { id, payload } => self.subscribe(id, payload),
            Command::Unsubscribe { id, payload } => self.unsubscribe(&id, payload),
            Command::AddListener { kind, id, listener } => {
                self.dispatcher.add_listener(kind, id, listener)
            }
            Command::RemoveListener { kind, id } => {
                if !self.dispatcher.remove_listener(kind, id) {
                    debug!("{}: no {:?} listener {:?}", self.options.connection_id, kind, id);
                }
            }
            Command::SetCallback { kind, callback } => self.dispatcher.set_callback(kind, callback),
            Command::Shutdown => {
                self.close(None, Some("shutdown"));
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    pub fn handle_transport(&mut self, envelope: TransportEnvelope) {
        let preamble: Vec<WsMessage> = match envelope.event {
            TransportEvent::Open { .. } => {
                self.subscriptions.iter().map(|(_, p)| p.clone()).collect()
            }
            _ => Vec::new(),
        };
        let events = self.socket.on_transport_event(envelope, &preamble);
        self.process(events);
    }

    pub fn handle_resolution(&mut self, resolution: Resolution) {
        let events = self.socket.on_resolved(resolution);
        self.process(events);
    }

    pub fn fire_due_timers(&mut self, now: Instant) {
        let events = self.socket.fire_due(now);
        self.process(events);

        if self.idle_deadline.is_some_and(|at| at <= now) {
            self.idle_deadline = None;
            self.on_idle();
        }
    }

    /// Post queued readiness events to the host.
    ///
    /// The engine calls this after publishing its snapshot, so a host that
    /// sees an event also sees the state that produced it.
    pub fn flush_host_events(&mut self) {
        for event in self.outbox.drain(..) {
            if self.host_tx.send(event).is_err() {
                debug!("{}: host receiver dropped", self.options.connection_id);
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [self.socket.next_deadline(), self.idle_deadline]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn snapshot(&self) -> Snapshot {
        let counters = self.socket.counters();
        Snapshot {
            state: self.state(),
            retry_count: self.socket.retry_count(),
            max_retries: self.socket.max_retries(),
            buffered_amount: self.socket.buffered_amount(),
            protocol: self.socket.protocol().to_string(),
            extensions: self.socket.extensions().to_string(),
            url: self.socket.url().to_string(),
            binary_mode: self.socket.binary_mode(),
            metrics: Metrics {
                messages_sent: counters.messages_sent,
                messages_received: counters.messages_received,
                connect_attempts: counters.connect_attempts,
                deferred: self.deferred.len(),
            },
        }
    }

    /// Last emitted readiness, or the raw state before any emission
    pub fn state(&self) -> ConnectionState {
        self.last_emitted
            .as_ref()
            .map_or_else(|| self.socket.ready_state().into(), |event| event.state)
    }

    // ---------------------------------------------------------------------
    // Consumer operations
    // ---------------------------------------------------------------------

    /// Send, or reconnect if the socket is closing or closed.
    ///
    /// In the reconnect case the payload is dropped.
    pub fn send(&mut self, message: WsMessage) {
        if self.socket.ready_state().is_closing_or_closed() {
            debug!(
                "{}: send while closed, reconnecting and dropping payload",
                self.options.connection_id
            );
            self.socket.reconnect(None, None);
        } else {
            self.socket.send(message);
        }
    }

    pub fn close(&mut self, code: Option<u16>, reason: Option<&str>) {
        self.socket.close(code, reason);
        self.idle_deadline = None;
    }

    pub fn reconnect(&mut self, code: Option<u16>, reason: Option<&str>) {
        self.socket.reconnect(code, reason);
    }

    /// Toggle deferral; switching it off delivers everything buffered
    pub fn set_defer_updates(&mut self, on: bool) {
        self.defer_updates = on;
        if on {
            return;
        }
        for message in self.deferred.take() {
            self.deliver(message);
        }
    }

    pub fn on_visibility_change(&mut self, visible: bool) {
        let silence = self
            .last_message_at
            .map_or(std::time::Duration::ZERO, |at| at.elapsed());
        let forced = self.options.watch_for_halted_state && silence >= self.options.halted_threshold();

        self.page_visible = visible;
        self.socket.on_visibility_change(visible, forced);

        if visible && !forced {
            self.emit(None);
        }
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn process(&mut self, events: Vec<SocketEvent>) {
        for event in events {
            self.react(&event);
            self.dispatcher.dispatch(&event);
        }
    }

    fn react(&mut self, event: &SocketEvent) {
        let id = &self.options.connection_id;
        match event {
            SocketEvent::Init => {
                debug!("{}: transport created", id);
                self.emit(None);
            }
            SocketEvent::Open => {
                info!("{}: connected", id);
                self.handler.on_open();
                self.emit(None);
            }
            SocketEvent::Close(close) => {
                info!("{}: closed (code {}, reason {:?})", id, close.code, close.reason);
                self.idle_deadline = None;
                self.handler.on_close(close);
                self.emit(None);
            }
            SocketEvent::Error(err) => {
                self.log_error(err);
                self.idle_deadline = None;
                self.handler.on_error(err);
                self.emit(None);
            }
            SocketEvent::Message(message) => self.on_message(message),
        }
    }

    fn log_error(&self, err: &ErrorEvent) {
        let id = &self.options.connection_id;
        if !err.is_timeout() {
            warn!("{}: socket error: {}", id, err.message);
        } else if self.socket.max_retry_limit_reached() {
            error!("{}: connection timed out and retries are exhausted", id);
        } else {
            debug!("{}: connection attempt timed out", id);
        }
    }

    fn on_message(&mut self, message: &WsMessage) {
        let now = Instant::now();
        self.last_message_at = Some(now);
        self.emit(None);

        if self.options.watch_message_for_state {
            self.idle_deadline = Some(now + self.options.idle_window());
        }

        let text = match message {
            WsMessage::Text(text) => Cow::Borrowed(text.as_str()),
            WsMessage::Binary(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => Cow::Borrowed(text),
                Err(_) => {
                    debug!(
                        "{}: ignoring {} byte non-UTF-8 payload",
                        self.options.connection_id,
                        bytes.len()
                    );
                    return;
                }
            },
        };

        if is_empty_payload(&text) {
            return;
        }

        let Some(parsed) = FeedMessage::parse(&text) else {
            info!("{}: received a regular string: {}", self.options.connection_id, text);
            return;
        };

        if parsed.is_closed() {
            info!("{}: server requested close", self.options.connection_id);
            self.close(None, None);
        } else if self.defer_updates {
            self.deferred.push(parsed);
        } else {
            self.deliver(parsed);
        }
    }

    fn on_idle(&mut self) {
        // silence only means something on a live socket
        if self.socket.ready_state() != TransportState::Open {
            return;
        }
        if self.page_visible && self.options.reconnect_on_idle_state {
            info!("{}: no traffic within idle window, reconnecting", self.options.connection_id);
            self.socket.reconnect(None, None);
        } else {
            self.emit(Some(ConnectionState::Idle));
        }
    }

    fn deliver(&mut self, message: FeedMessage) {
        if let Err(e) = self.handler.handle(message) {
            error!("{}: handler failed: {}", self.options.connection_id, e);
        }
    }

    /// Emit readiness if the derived state changed.
    ///
    /// Without a transport only an explicit state is reported.
    fn emit(&mut self, state_override: Option<ConnectionState>) {
        if !self.socket.has_transport() && state_override.is_none() {
            return;
        }

        let raw = state_override.unwrap_or_else(|| self.socket.ready_state().into());
        let next = if raw == ConnectionState::Connected && self.last_message_at.is_none() {
            ConnectionState::Muted
        } else {
            raw
        };

        if self.last_emitted.as_ref().map(|event| event.state) == Some(next) {
            return;
        }

        let event = ReadyStateEvent {
            connection_id: self.options.connection_id.clone(),
            state: next,
            retry_count: self.socket.retry_count(),
            max_retries: self.socket.max_retries(),
        };
        debug!("{}: ready state {}", event.connection_id, next);

        self.outbox.push(HostEvent::ReadyState(event.clone()));
        self.handler.on_state_change(&event);
        self.last_emitted = Some(event);
    }
}
