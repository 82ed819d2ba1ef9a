use crate::connection::{Connection, HostEvent};
use crate::dispatcher::{EventKind, Listener, ListenerId, SocketEvent};
use crate::scheduler::Resolution;
use crate::traits::*;
use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, info};

/// Control messages from the handle to the engine task
pub enum Command {
    /// Send a payload (or reconnect if closed)
    Send(WsMessage),
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
    Reconnect {
        code: Option<u16>,
        reason: Option<String>,
    },
    SetDeferUpdates(bool),
    SetVisibility(bool),
    SetBinaryMode(BinaryMode),
    Subscribe {
        id: String,
        payload: WsMessage,
    },
    Unsubscribe {
        id: String,
        payload: Option<WsMessage>,
    },
    AddListener {
        kind: EventKind,
        id: ListenerId,
        listener: Listener,
    },
    RemoveListener {
        kind: EventKind,
        id: ListenerId,
    },
    SetCallback {
        kind: EventKind,
        callback: Option<Listener>,
    },
    /// Close the transport and stop the engine
    Shutdown,
}

/// Client metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub connect_attempts: u64,
    /// Messages currently held by deferral
    pub deferred: usize,
}

/// Point-in-time view of the connection, republished after every engine step
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: ConnectionState,
    pub retry_count: u32,
    pub max_retries: Option<u32>,
    pub buffered_amount: usize,
    pub protocol: String,
    pub extensions: String,
    pub url: String,
    pub binary_mode: BinaryMode,
    pub metrics: Metrics,
}

/// Handle to a resilient WebSocket connection
///
/// All connection state lives in a single tokio task; this handle only
/// posts commands and reads snapshots:
/// - Lock-free readiness via an atomic
/// - Readiness and data notifications over an unbounded crossbeam channel
/// - Accessors served from the last published [`Snapshot`]
///
/// Dropping the handle closes the connection and stops the task.
pub struct ResilientClient {
    command_tx: UnboundedSender<Command>,
    event_rx: Receiver<HostEvent>,
    state: Arc<AtomicConnectionState>,
    snapshot: Arc<RwLock<Snapshot>>,
    next_listener: AtomicU64,
    task_handle: Option<tokio::task::JoinHandle<()>>,
    /// Dedicated OS threads owned by the handler (e.g. the batcher)
    pub(crate) handler_handles: Vec<std::thread::JoinHandle<()>>,
}

impl ResilientClient {
    /// Spawn the engine task.
    ///
    /// Called by the builder's `build()` method. Use `resocket::builder()`
    /// to create a client.
    pub(crate) fn spawn<H, C>(
        connection: Connection<H, C>,
        transport_rx: UnboundedReceiver<TransportEnvelope>,
        resolved_rx: UnboundedReceiver<Resolution>,
        event_rx: Receiver<HostEvent>,
    ) -> Self
    where
        H: MessageHandler,
        C: Connector,
    {
        let initial = connection.snapshot();
        let state = Arc::new(AtomicConnectionState::new(initial.state));
        let snapshot = Arc::new(RwLock::new(initial));
        let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();

        let task_handle = {
            let state = Arc::clone(&state);
            let snapshot = Arc::clone(&snapshot);

            tokio::spawn(async move {
                run_engine(connection, command_rx, transport_rx, resolved_rx, state, snapshot).await;
            })
        };

        Self {
            command_tx,
            event_rx,
            state,
            snapshot,
            next_listener: AtomicU64::new(1),
            task_handle: Some(task_handle),
            handler_handles: Vec::new(),
        }
    }

    fn post(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| SocketError::ChannelSend("connection task has stopped".into()))
    }

    /// Send a payload.
    ///
    /// Queued while connecting; triggers a reconnect (and is dropped) when
    /// the connection is closing or closed.
    pub fn send(&self, message: impl Into<WsMessage>) -> Result<()> {
        self.post(Command::Send(message.into()))
    }

    /// Close with code 1000 and stop reconnecting
    pub fn close(&self) -> Result<()> {
        self.post(Command::Close {
            code: None,
            reason: None,
        })
    }

    pub fn close_with(&self, code: u16, reason: impl Into<String>) -> Result<()> {
        self.post(Command::Close {
            code: Some(code),
            reason: Some(reason.into()),
        })
    }

    /// Drop the current connection and start over with a fresh retry count
    pub fn reconnect(&self) -> Result<()> {
        self.post(Command::Reconnect {
            code: None,
            reason: None,
        })
    }

    pub fn reconnect_with(&self, code: u16, reason: impl Into<String>) -> Result<()> {
        self.post(Command::Reconnect {
            code: Some(code),
            reason: Some(reason.into()),
        })
    }

    /// Hold (true) or release (false) inbound messages
    pub fn set_defer_updates(&self, defer: bool) -> Result<()> {
        self.post(Command::SetDeferUpdates(defer))
    }

    /// Report host visibility
    pub fn set_visibility(&self, visible: bool) -> Result<()> {
        self.post(Command::SetVisibility(visible))
    }

    pub fn set_binary_mode(&self, mode: BinaryMode) -> Result<()> {
        self.post(Command::SetBinaryMode(mode))
    }

    /// Register a payload that is resent after every (re)connect
    pub fn subscribe(&self, id: impl Into<String>, payload: impl Into<WsMessage>) -> Result<()> {
        self.post(Command::Subscribe {
            id: id.into(),
            payload: payload.into(),
        })
    }

    pub fn unsubscribe(&self, id: impl Into<String>, payload: Option<WsMessage>) -> Result<()> {
        self.post(Command::Unsubscribe {
            id: id.into(),
            payload,
        })
    }

    /// Register a listener; it runs on the connection task
    pub fn add_listener<F>(&self, kind: EventKind, listener: F) -> Result<ListenerId>
    where
        F: FnMut(&SocketEvent) + Send + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.post(Command::AddListener {
            kind,
            id,
            listener: Box::new(listener),
        })?;
        Ok(id)
    }

    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> Result<()> {
        self.post(Command::RemoveListener { kind, id })
    }

    /// Set the single callback slot for `kind`; it runs before listeners
    pub fn set_callback<F>(&self, kind: EventKind, callback: F) -> Result<()>
    where
        F: FnMut(&SocketEvent) + Send + 'static,
    {
        self.post(Command::SetCallback {
            kind,
            callback: Some(Box::new(callback)),
        })
    }

    pub fn clear_callback(&self, kind: EventKind) -> Result<()> {
        self.post(Command::SetCallback {
            kind,
            callback: None,
        })
    }

    /// Get current readiness
    #[inline]
    pub fn ready_state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Check if the socket is open
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.read().clone()
    }

    pub fn retry_count(&self) -> u32 {
        self.snapshot.read().retry_count
    }

    pub fn buffered_amount(&self) -> usize {
        self.snapshot.read().buffered_amount
    }

    /// Negotiated sub-protocol, empty before the first open
    pub fn protocol(&self) -> String {
        self.snapshot.read().protocol.clone()
    }

    pub fn extensions(&self) -> String {
        self.snapshot.read().extensions.clone()
    }

    pub fn url(&self) -> String {
        self.snapshot.read().url.clone()
    }

    pub fn binary_mode(&self) -> BinaryMode {
        self.snapshot.read().binary_mode
    }

    /// Get current metrics
    pub fn metrics(&self) -> Metrics {
        self.snapshot.read().metrics.clone()
    }

    /// Try to receive a host event (non-blocking)
    pub fn try_recv_event(&self) -> Option<HostEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive a host event (blocking)
    pub fn recv_event(&self) -> std::result::Result<HostEvent, crossbeam_channel::RecvError> {
        self.event_rx.recv()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<HostEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Receiver for host events, e.g. to hand to another thread
    pub fn events(&self) -> Receiver<HostEvent> {
        self.event_rx.clone()
    }

    /// Close the connection and wait for the engine and handler threads
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down resilient client");

        let _ = self.command_tx.send(Command::Shutdown);

        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }

        // The engine dropped the handler, so handler channels are closed
        debug!("Waiting for {} handler threads to complete", self.handler_handles.len());
        for handle in self.handler_handles.drain(..) {
            let _ = handle.join();
        }

        info!("Client shut down");
        Ok(())
    }
}

/// Engine task: the only place connection state is touched
async fn run_engine<H, C>(
    mut connection: Connection<H, C>,
    mut command_rx: UnboundedReceiver<Command>,
    mut transport_rx: UnboundedReceiver<TransportEnvelope>,
    mut resolved_rx: UnboundedReceiver<Resolution>,
    state: Arc<AtomicConnectionState>,
    snapshot: Arc<RwLock<Snapshot>>,
) where
    H: MessageHandler,
    C: Connector,
{
    connection.start();
    publish(&mut connection, &state, &snapshot);

    loop {
        let deadline = connection.next_deadline();

        tokio::select! {
            command = command_rx.recv() => match command {
                Some(command) => {
                    if connection.handle_command(command).is_break() {
                        info!("Received shutdown command");
                        break;
                    }
                }
                None => {
                    debug!("Command channel closed");
                    connection.close(None, Some("shutdown"));
                    break;
                }
            },
            Some(envelope) = transport_rx.recv() => connection.handle_transport(envelope),
            Some(resolution) = resolved_rx.recv() => connection.handle_resolution(resolution),
            _ = wait_until(deadline) => connection.fire_due_timers(Instant::now()),
        }

        publish(&mut connection, &state, &snapshot);
    }

    publish(&mut connection, &state, &snapshot);
    info!("Connection task exiting");
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Publish the snapshot, then release the host events it accounts for
fn publish<H, C>(
    connection: &mut Connection<H, C>,
    state: &AtomicConnectionState,
    snapshot: &RwLock<Snapshot>,
) where
    H: MessageHandler,
    C: Connector,
{
    let current = connection.snapshot();
    state.set(current.state);
    *snapshot.write() = current;
    connection.flush_host_events();
}
