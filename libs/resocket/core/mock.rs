//! In-memory connector for engine tests
//!
//! Transports never emit on their own; tests inject events and mirror them
//! onto the transport with [`MockTransport::apply`].

use crate::traits::*;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct Record {
    id: u64,
    state: TransportState,
    binary_mode: BinaryMode,
    sent: Vec<WsMessage>,
    closed_with: Option<(u16, String)>,
    close_calls: usize,
}

#[derive(Debug, Clone)]
pub struct MockTransport {
    url: String,
    record: Arc<Mutex<Record>>,
}

impl MockTransport {
    pub fn id(&self) -> u64 {
        self.record.lock().id
    }

    pub fn state(&self) -> TransportState {
        self.record.lock().state
    }

    pub fn sent(&self) -> Vec<WsMessage> {
        self.record.lock().sent.clone()
    }

    pub fn closed_with(&self) -> Option<(u16, String)> {
        self.record.lock().closed_with.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.record.lock().close_calls
    }

    /// Mirror an injected event onto the transport state
    pub fn apply(&self, event: &TransportEvent) {
        let mut record = self.record.lock();
        match event {
            TransportEvent::Open { .. } => record.state = TransportState::Open,
            TransportEvent::Close(_) => record.state = TransportState::Closed,
            _ => {}
        }
    }
}

impl Transport for MockTransport {
    fn send(&mut self, message: WsMessage) -> Result<()> {
        self.record.lock().sent.push(message);
        Ok(())
    }

    fn close(&mut self, code: u16, reason: &str) {
        let mut record = self.record.lock();
        record.close_calls += 1;
        record.closed_with = Some((code, reason.to_string()));
        if record.state != TransportState::Closed {
            record.state = TransportState::Closing;
        }
    }

    fn ready_state(&self) -> TransportState {
        self.record.lock().state
    }

    fn buffered_amount(&self) -> usize {
        0
    }

    fn binary_mode(&self) -> BinaryMode {
        self.record.lock().binary_mode
    }

    fn set_binary_mode(&mut self, mode: BinaryMode) {
        self.record.lock().binary_mode = mode;
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Default)]
struct Inner {
    transports: Vec<MockTransport>,
    urls: Vec<String>,
    fail_next: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<Inner>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transports created so far
    pub fn created(&self) -> usize {
        self.inner.lock().transports.len()
    }

    /// Most recently created transport
    pub fn last(&self) -> MockTransport {
        self.inner
            .lock()
            .transports
            .last()
            .cloned()
            .expect("no transport created yet")
    }

    pub fn urls(&self) -> Vec<String> {
        self.inner.lock().urls.clone()
    }

    /// Make the next `connect` call fail synchronously
    pub fn fail_next(&self) {
        self.inner.lock().fail_next = true;
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn connect(&mut self, request: ConnectRequest, events: EventSink) -> Result<MockTransport> {
        let mut inner = self.inner.lock();
        if std::mem::take(&mut inner.fail_next) {
            return Err(SocketError::WebSocket("connector refused".into()));
        }

        let transport = MockTransport {
            url: request.url.clone(),
            record: Arc::new(Mutex::new(Record {
                id: events.transport_id(),
                state: TransportState::Connecting,
                binary_mode: request.binary_mode,
                sent: Vec::new(),
                closed_with: None,
                close_calls: 0,
            })),
        };
        inner.urls.push(request.url);
        inner.transports.push(transport.clone());
        Ok(transport)
    }
}
