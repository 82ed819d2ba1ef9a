//! tokio-tungstenite transport
//!
//! Each transport is a handle plus one I/O task. The handle pushes frames
//! and close requests into the task over an unbounded channel and reads
//! the ready state from an atomic the task keeps current. The task reports
//! open, messages, errors and the final close through its [`EventSink`].

use crate::traits::*;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// Status reported when the peer closes without a status code
const CLOSE_NO_STATUS: u16 = 1005;

/// How long to wait for the peer's close frame after sending ours
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

enum Outgoing {
    Frame(WsMessage),
    Close(u16, String),
}

/// Default connector: one tokio-tungstenite connection per attempt
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    type Transport = TungsteniteTransport;

    fn connect(&mut self, request: ConnectRequest, events: EventSink) -> Result<TungsteniteTransport> {
        let client_request = build_request(&request)?;

        let state = Arc::new(AtomicTransportState::new(TransportState::Connecting));
        let buffered = Arc::new(AtomicUsize::new(0));
        let text_mode = Arc::new(AtomicBool::new(request.binary_mode == BinaryMode::Text));
        let (outgoing_tx, outgoing_rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(run_transport(
            client_request,
            Arc::clone(&state),
            Arc::clone(&buffered),
            Arc::clone(&text_mode),
            outgoing_rx,
            events,
        ));

        Ok(TungsteniteTransport {
            url: request.url,
            state,
            buffered,
            text_mode,
            outgoing_tx,
        })
    }
}

pub struct TungsteniteTransport {
    url: String,
    state: Arc<AtomicTransportState>,
    buffered: Arc<AtomicUsize>,
    text_mode: Arc<AtomicBool>,
    outgoing_tx: UnboundedSender<Outgoing>,
}

impl Transport for TungsteniteTransport {
    fn send(&mut self, message: WsMessage) -> Result<()> {
        if self.state.get() != TransportState::Open {
            return Err(SocketError::ConnectionClosed(format!(
                "transport is {:?}",
                self.state.get()
            )));
        }

        let size = message.size_hint();
        self.buffered.fetch_add(size, Ordering::AcqRel);
        self.outgoing_tx.send(Outgoing::Frame(message)).map_err(|e| {
            self.buffered.fetch_sub(size, Ordering::AcqRel);
            SocketError::ChannelSend(e.to_string())
        })
    }

    fn close(&mut self, code: u16, reason: &str) {
        if self.state.get() == TransportState::Closed {
            return;
        }
        self.state.set(TransportState::Closing);
        let _ = self.outgoing_tx.send(Outgoing::Close(code, reason.to_string()));
    }

    fn ready_state(&self) -> TransportState {
        self.state.get()
    }

    fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    fn binary_mode(&self) -> BinaryMode {
        if self.text_mode.load(Ordering::Acquire) {
            BinaryMode::Text
        } else {
            BinaryMode::Bytes
        }
    }

    fn set_binary_mode(&mut self, mode: BinaryMode) {
        self.text_mode.store(mode == BinaryMode::Text, Ordering::Release);
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Build the handshake request, offering sub-protocols if any
fn build_request(request: &ConnectRequest) -> Result<Request> {
    let mut client_request = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| SocketError::WebSocket(format!("invalid url {}: {}", request.url, e)))?;

    if !request.protocols.is_empty() {
        let value = request.protocols.join(", ");
        match value.parse::<http::header::HeaderValue>() {
            Ok(header_value) => {
                client_request
                    .headers_mut()
                    .insert(http::header::SEC_WEBSOCKET_PROTOCOL, header_value);
            }
            Err(_) => {
                return Err(SocketError::Configuration(format!(
                    "invalid sub-protocol list: {}",
                    value
                )));
            }
        }
    }

    Ok(client_request)
}

/// Wait for a close request while the handshake runs.
///
/// Frames cannot be sent yet and are discarded. A dropped handle counts as
/// a normal close.
async fn close_requested(outgoing: &mut UnboundedReceiver<Outgoing>) -> (u16, String) {
    loop {
        match outgoing.recv().await {
            Some(Outgoing::Close(code, reason)) => return (code, reason),
            Some(Outgoing::Frame(_)) => continue,
            None => return (CLOSE_NORMAL, String::new()),
        }
    }
}

async fn run_transport(
    request: Request,
    state: Arc<AtomicTransportState>,
    buffered: Arc<AtomicUsize>,
    text_mode: Arc<AtomicBool>,
    mut outgoing: UnboundedReceiver<Outgoing>,
    events: EventSink,
) {
    let handshake = tokio::select! {
        result = connect_async(request) => Ok(result),
        (code, reason) = close_requested(&mut outgoing) => Err((code, reason)),
    };

    let (stream, response) = match handshake {
        Ok(Ok(connected)) => connected,
        Ok(Err(e)) => {
            debug!("Transport {} handshake failed: {}", events.transport_id(), e);
            state.set(TransportState::Closed);
            events.emit(TransportEvent::Error(ErrorEvent::new(e.to_string())));
            events.emit(TransportEvent::Close(CloseEvent::new(CLOSE_ABNORMAL, "", false)));
            return;
        }
        Err((code, reason)) => {
            debug!("Transport {} closed before open ({})", events.transport_id(), code);
            state.set(TransportState::Closed);
            events.emit(TransportEvent::Close(CloseEvent::new(CLOSE_ABNORMAL, reason, false)));
            return;
        }
    };

    let header = |name: http::header::HeaderName| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let protocol = header(http::header::SEC_WEBSOCKET_PROTOCOL);
    let extensions = header(http::header::SEC_WEBSOCKET_EXTENSIONS);

    state.set(TransportState::Open);
    if !events.emit(TransportEvent::Open {
        protocol,
        extensions,
    }) {
        // engine is gone
        state.set(TransportState::Closed);
        return;
    }

    let (mut write, mut read) = stream.split();

    let close = loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    events.emit(TransportEvent::Message(WsMessage::Text(text)));
                }
                Some(Ok(Message::Binary(data))) => {
                    let message = if text_mode.load(Ordering::Acquire) {
                        WsMessage::Text(String::from_utf8_lossy(&data).into_owned())
                    } else {
                        WsMessage::Binary(data)
                    };
                    events.emit(TransportEvent::Message(message));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    debug!("Transport {} closed by peer ({})", events.transport_id(), code);
                    break CloseEvent::new(code, reason, true);
                }
                // ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) if is_abrupt_close(&e) => {
                    debug!("Transport {} dropped: {}", events.transport_id(), e);
                    break CloseEvent::new(CLOSE_ABNORMAL, "", false);
                }
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    events.emit(TransportEvent::Error(ErrorEvent::new(e.to_string())));
                    break CloseEvent::new(CLOSE_ABNORMAL, "", false);
                }
                None => {
                    debug!("Transport {} stream ended", events.transport_id());
                    break CloseEvent::new(CLOSE_ABNORMAL, "", false);
                }
            },
            command = outgoing.recv() => match command {
                Some(Outgoing::Frame(message)) => {
                    let size = message.size_hint();
                    let result = write.send(to_tungstenite(message)).await;
                    buffered.fetch_sub(size, Ordering::AcqRel);
                    if let Err(e) = result {
                        warn!("Failed to write frame: {}", e);
                        events.emit(TransportEvent::Error(ErrorEvent::new(e.to_string())));
                        break CloseEvent::new(CLOSE_ABNORMAL, "", false);
                    }
                }
                Some(Outgoing::Close(code, reason)) => {
                    state.set(TransportState::Closing);
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    await_peer_close(&mut read).await;
                    break CloseEvent::new(code, reason, true);
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break CloseEvent::new(CLOSE_NORMAL, "", true);
                }
            }
        }
    };

    state.set(TransportState::Closed);
    buffered.store(0, Ordering::Release);
    events.emit(TransportEvent::Close(close));
}

async fn await_peer_close<S>(read: &mut S)
where
    S: futures::Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    let drained = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
        while let Some(Ok(message)) = read.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await;

    if drained.is_err() {
        debug!("Peer did not answer close frame in time");
    }
}

/// Peer went away without a close handshake; reported as a 1006 close only
fn is_abrupt_close(error: &WsError) -> bool {
    matches!(
        error,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    ) || matches!(error, WsError::Io(e) if e.kind() == std::io::ErrorKind::ConnectionReset)
}

fn to_tungstenite(message: WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
    }
}
