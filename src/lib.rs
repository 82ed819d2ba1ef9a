//! Newsdesk - Main Library
//!
//! Live news feed consumer built on the resocket client.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, runners, shutdown)
//! - **news**: Headline model, feed configuration and the desk aggregating batches
//! - **resocket**: Resilient WebSocket client (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use newsdesk::bin_common::{load_config_from_env, ConfigType};
//! use newsdesk::news::{FeedConfig, NewsFeedApp};
//! ```

// Re-export workspace libraries for convenience
pub use resocket;

pub mod news;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;
    pub mod shutdown;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use runner::{BinaryRunner, RunConfig};
    pub use shutdown::ShutdownManager;
}
