use anyhow::{Context, Result};
use newsdesk::bin_common::{
    cli::config_type_from_args, load_config_from_env, parse_args, BinaryRunner, ShutdownManager,
};
use newsdesk::news::{FeedConfig, NewsFeedApp};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load config first (before logging is initialized)
    let config_path = load_config_from_env(config_type_from_args(&parse_args()));
    let config = FeedConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .init();
    config.log();

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let mut app = NewsFeedApp::new(config, shutdown).await?;
    app.execute().await
}
