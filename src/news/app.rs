//! News feed runner
//!
//! Builds a batched resocket client from [`FeedConfig`], drains its host
//! events into a [`NewsDesk`] and logs readiness changes and batches.

use super::config::FeedConfig;
use super::desk::NewsDesk;
use crate::bin_common::{BinaryRunner, RunConfig, ShutdownManager};
use anyhow::Context;
use resocket::{ConnectionState, HostEvent, ReadyStateEvent, ResilientClient};
use tracing::{info, warn};

/// Subscription id of the handshake payload
const HANDSHAKE_ID: &str = "handshake";

/// What the host knows: last readiness and the desk
#[derive(Debug)]
pub struct FeedView {
    pub desk: NewsDesk,
    pub ready: Option<ReadyStateEvent>,
    pub batches: u64,
}

impl FeedView {
    pub fn new(capacity: usize) -> Self {
        Self {
            desk: NewsDesk::new(capacity),
            ready: None,
            batches: 0,
        }
    }

    pub fn state(&self) -> Option<ConnectionState> {
        self.ready.as_ref().map(|r| r.state)
    }

    pub fn apply(&mut self, event: HostEvent) {
        match event {
            HostEvent::ReadyState(ready) => {
                match ready.state {
                    ConnectionState::Closed => warn!(
                        "[{}] closed (retry {}/{:?})",
                        ready.connection_id, ready.retry_count, ready.max_retries
                    ),
                    state => info!("[{}] {}", ready.connection_id, state),
                }
                self.ready = Some(ready);
            }
            HostEvent::Data(batch) => {
                self.batches += 1;
                let update = self.desk.ingest(&batch);
                info!(
                    "Batch #{}: {} headlines ({} skipped), {} stored",
                    self.batches,
                    update.added,
                    update.skipped,
                    self.desk.len()
                );
                if let Some(latest) = self.desk.latest() {
                    info!("  latest [{}] {}", latest.source, latest.headline);
                }
                if update.options_changed {
                    let options = self.desk.options();
                    info!(
                        "  filters: {} sources, {} assets, {} keywords",
                        options.sources.len(),
                        options.assets.len(),
                        options.keywords.len()
                    );
                }
            }
        }
    }
}

pub struct NewsFeedApp {
    run_config: RunConfig,
    client: Option<ResilientClient>,
    view: FeedView,
    shutdown: ShutdownManager,
}

impl NewsFeedApp {
    pub async fn new(config: FeedConfig, shutdown: ShutdownManager) -> anyhow::Result<Self> {
        let mut builder = resocket::builder()
            .url(config.url.clone())
            .batched(config.batch_window())
            .retry_policy(config.retry.clone())
            .options(config.connection.clone());

        if let Some(handshake) = &config.handshake {
            builder = builder.subscription(HANDSHAKE_ID, handshake.as_str());
        }

        let client = builder
            .build()
            .await
            .context("failed to start feed client")?;

        Ok(Self {
            run_config: RunConfig::new("News Feed").with_heartbeat(config.heartbeat_secs),
            client: Some(client),
            view: FeedView::new(config.max_headlines),
            shutdown,
        })
    }

    pub fn view(&self) -> &FeedView {
        &self.view
    }
}

impl BinaryRunner for NewsFeedApp {
    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn shutdown(&self) -> &ShutdownManager {
        &self.shutdown
    }

    async fn tick(&mut self) -> anyhow::Result<()> {
        let client = self.client.as_ref().context("feed client already shut down")?;
        while let Some(event) = client.try_recv_event() {
            self.view.apply(event);
        }
        Ok(())
    }

    fn heartbeat(&self) {
        let Some(client) = self.client.as_ref() else {
            return;
        };
        let metrics = client.metrics();
        info!(
            "Heartbeat: {} ({} received, {} sent, {} attempts, {} headlines stored)",
            client.ready_state(),
            metrics.messages_received,
            metrics.messages_sent,
            metrics.connect_attempts,
            self.view.desk.len()
        );
    }

    async fn finish(&mut self) -> anyhow::Result<()> {
        if let Some(client) = self.client.take() {
            client.shutdown().await.context("client shutdown failed")?;
        }
        Ok(())
    }

    fn stats(&self) -> Option<String> {
        Some(format!(
            "{} batches, {} headlines stored, {} high priority",
            self.view.batches,
            self.view.desk.len(),
            self.view.desk.high_priority_count()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resocket::FeedMessage;

    fn ready(state: ConnectionState) -> HostEvent {
        HostEvent::ReadyState(ReadyStateEvent {
            state,
            retry_count: 0,
            max_retries: Some(9),
            connection_id: "news".into(),
        })
    }

    #[test]
    fn test_view_tracks_readiness() {
        let mut view = FeedView::new(10);
        assert_eq!(view.state(), None);

        view.apply(ready(ConnectionState::Connecting));
        view.apply(ready(ConnectionState::Muted));
        assert_eq!(view.state(), Some(ConnectionState::Muted));
    }

    #[test]
    fn test_view_ingests_batches() {
        let mut view = FeedView::new(10);
        let batch = vec![
            FeedMessage::parse(r#"{"id":"2","source":"Wire","headline":"b","timestamp":2}"#)
                .unwrap(),
            FeedMessage::parse(r#"{"id":"1","source":"Wire","headline":"a","timestamp":1}"#)
                .unwrap(),
        ];

        view.apply(HostEvent::Data(batch));
        assert_eq!(view.batches, 1);
        assert_eq!(view.desk.len(), 2);
        assert_eq!(view.desk.latest().unwrap().id, "2");
    }
}
