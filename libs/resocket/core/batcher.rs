//! Debounced batching handler
//!
//! Delivered messages are moved to a dedicated thread and posted to the host
//! as one [`HostEvent::Data`] once the feed has been quiet for the batch
//! window. Within a batch the newest message comes first.

use crate::connection::HostEvent;
use crate::traits::*;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};

/// Default quiet period before a batch is posted
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(300);

pub struct DebouncedBatcher {
    tx: Sender<FeedMessage>,
}

impl DebouncedBatcher {
    /// Start the batching thread.
    ///
    /// The thread flushes what it holds and exits once the batcher is dropped.
    pub fn spawn(window: Duration, host_tx: Sender<HostEvent>) -> Result<(Self, JoinHandle<()>)> {
        let (tx, rx) = unbounded();
        let handle = std::thread::Builder::new()
            .name("resocket-batcher".into())
            .spawn(move || run_batcher(rx, window, host_tx))
            .map_err(|e| SocketError::Handler(format!("failed to spawn batcher thread: {}", e)))?;
        Ok((Self { tx }, handle))
    }
}

impl MessageHandler for DebouncedBatcher {
    fn handle(&mut self, message: FeedMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|e| SocketError::ChannelSend(e.to_string()))
    }
}

fn run_batcher(rx: Receiver<FeedMessage>, window: Duration, host_tx: Sender<HostEvent>) {
    let mut batch = Vec::new();

    loop {
        match rx.recv_timeout(window) {
            Ok(message) => batch.push(message),
            Err(RecvTimeoutError::Timeout) => flush(&mut batch, &host_tx),
            Err(RecvTimeoutError::Disconnected) => {
                flush(&mut batch, &host_tx);
                debug!("Batcher channel closed, thread exiting");
                break;
            }
        }
    }
}

fn flush(batch: &mut Vec<FeedMessage>, host_tx: &Sender<HostEvent>) {
    if batch.is_empty() {
        return;
    }
    let mut messages = std::mem::take(batch);
    messages.reverse();
    debug!("Posting batch of {} messages", messages.len());
    if host_tx.send(HostEvent::Data(messages)).is_err() {
        error!("Host receiver dropped, batch discarded");
    }
}
