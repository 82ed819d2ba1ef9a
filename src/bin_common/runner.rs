//! Binary runner utilities
//!
//! A binary implements [`BinaryRunner::tick`]; [`BinaryRunner::execute`]
//! drives it until shutdown, logging a status heartbeat on the way.

use super::shutdown::ShutdownManager;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// Status heartbeat interval in seconds
    pub heartbeat_interval_secs: u64,
    /// Pause between ticks
    pub poll_interval: Duration,
}

impl RunConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            heartbeat_interval_secs: 300,
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn with_heartbeat(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Poll-loop binary
pub trait BinaryRunner {
    fn config(&self) -> &RunConfig;

    fn shutdown(&self) -> &ShutdownManager;

    /// One pass of the main loop; errors are logged and the loop goes on
    async fn tick(&mut self) -> anyhow::Result<()>;

    /// Called every heartbeat interval
    fn heartbeat(&self) {}

    /// Release resources once the loop has stopped
    async fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// One-line summary logged on shutdown
    fn stats(&self) -> Option<String> {
        None
    }

    /// Run until the shutdown manager stops, then finish
    async fn execute(&mut self) -> anyhow::Result<()> {
        let name = self.config().name.clone();
        info!("========================================");
        info!("Starting {} (Ctrl+C to stop)", name);
        info!("========================================");

        let heartbeat = self.config().heartbeat_interval();
        let poll = self.config().poll_interval;
        let mut last_beat = Instant::now();

        while self.shutdown().is_running() {
            if let Err(e) = self.tick().await {
                error!("{} tick failed: {:#}", name, e);
            }

            if last_beat.elapsed() >= heartbeat {
                self.heartbeat();
                last_beat = Instant::now();
            }

            self.shutdown().interruptible_sleep(poll).await;
        }

        let result = self.finish().await;

        info!("========================================");
        info!("{} stopped", name);
        if let Some(stats) = self.stats() {
            info!("{}", stats);
        }
        info!("========================================");
        result
    }
}
