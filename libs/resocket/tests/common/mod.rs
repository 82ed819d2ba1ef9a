//! Common test utilities for resocket integration tests
//!
//! Provides a mock feed server that records what clients send, can push
//! frames and kick every open connection, plus small helpers for waiting
//! on readiness.

#![allow(dead_code)]

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use resocket::*;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

#[derive(Debug, Clone)]
enum Control {
    Push(String),
    Kick,
}

/// A mock feed server for testing
///
/// - Sends `greeting` (if any) right after each handshake
/// - Records every text frame received, across connections
/// - Selects the first offered sub-protocol
pub struct MockFeedServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    control: broadcast::Sender<Control>,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
}

impl MockFeedServer {
    /// Start a server that stays silent until pushed to
    pub async fn start() -> Self {
        Self::start_with_greeting(None).await
    }

    /// Start a server that greets every connection
    pub async fn start_with_greeting(greeting: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let (control, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));

        {
            let shutdown = Arc::clone(&shutdown);
            let control = control.clone();
            let connections = Arc::clone(&connections);
            let received = Arc::clone(&received);
            let greeting = greeting.map(str::to_string);

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        result = listener.accept() => {
                            match result {
                                Ok((stream, _)) => {
                                    let ctx = ConnectionCtx {
                                        shutdown: Arc::clone(&shutdown),
                                        control: control.subscribe(),
                                        connections: Arc::clone(&connections),
                                        received: Arc::clone(&received),
                                        greeting: greeting.clone(),
                                    };
                                    tokio::spawn(handle_connection(stream, ctx));
                                }
                                Err(e) => {
                                    eprintln!("Accept error: {}", e);
                                    break;
                                }
                            }
                        }
                        _ = shutdown.notified() => {
                            break;
                        }
                    }
                }
            });
        }

        Self {
            addr,
            shutdown,
            control,
            connections,
            received,
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Completed handshakes so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Text frames received from clients, in arrival order
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Send a text frame on every open connection
    pub fn push(&self, text: &str) {
        let _ = self.control.send(Control::Push(text.to_string()));
    }

    /// Drop every open connection without a close handshake
    pub fn kick(&self) {
        let _ = self.control.send(Control::Kick);
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockFeedServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ConnectionCtx {
    shutdown: Arc<Notify>,
    control: broadcast::Receiver<Control>,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
    greeting: Option<String>,
}

async fn handle_connection(stream: tokio::net::TcpStream, mut ctx: ConnectionCtx) {
    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::Message;

    let select_protocol = |req: &Request, mut resp: Response| -> std::result::Result<Response, ErrorResponse> {
        let offered = req
            .headers()
            .get("sec-websocket-protocol")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|p| p.trim().to_string());
        if let Some(protocol) = offered {
            resp.headers_mut()
                .insert("sec-websocket-protocol", protocol.parse().unwrap());
        }
        Ok(resp)
    };

    let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, select_protocol).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    ctx.connections.fetch_add(1, Ordering::SeqCst);

    let (mut write, mut read) = ws_stream.split();

    if let Some(greeting) = ctx.greeting.take() {
        if write.send(Message::Text(greeting)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => ctx.received.lock().push(text),
                    Some(Ok(msg)) if msg.is_close() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            control = ctx.control.recv() => {
                match control {
                    Ok(Control::Push(text)) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Control::Kick) | Err(_) => break,
                }
            }
            _ = ctx.shutdown.notified() => {
                break;
            }
        }
    }
}

/// Address nothing listens on
pub async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}", addr)
}

/// Short delays so tests finish quickly
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        min_reconnection_delay_ms: 20,
        max_reconnection_delay_ms: 100,
        reconnection_delay_grow_factor: 1.3,
        min_uptime_ms: 200,
        connection_timeout_ms: 2000,
        max_retries: None,
        max_enqueued_messages: None,
        start_closed: false,
        debug: true,
    }
}

/// Options with deferral off so messages flow straight to the handler
pub fn live_options() -> ConnectionOptions {
    ConnectionOptions {
        connection_id: "test-feed".into(),
        defer_updates: false,
        ..ConnectionOptions::default()
    }
}

/// Handler forwarding every delivered message to a channel
pub struct ChannelHandler {
    pub tx: Sender<FeedMessage>,
}

impl MessageHandler for ChannelHandler {
    fn handle(&mut self, message: FeedMessage) -> resocket::Result<()> {
        self.tx
            .send(message)
            .map_err(|e| SocketError::ChannelSend(e.to_string()))
    }
}

/// Drain host events until `state` is reported or the timeout passes
pub async fn wait_for_state(
    client: &ResilientClient,
    state: ConnectionState,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        while let Some(event) = client.try_recv_event() {
            if let HostEvent::ReadyState(ready) = event {
                verbose_println!("  ready state: {:?}", ready);
                if ready.state == state {
                    return true;
                }
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll `condition` until it holds or the timeout passes
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
