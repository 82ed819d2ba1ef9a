//! News feed domain
//!
//! - **config**: YAML configuration for the feed binary
//! - **headline**: headline model, filter values and filters
//! - **desk**: newest-first store fed by client batches
//! - **app**: the runner wiring the client to the desk

pub mod app;
pub mod config;
pub mod desk;
pub mod headline;

pub use app::{FeedView, NewsFeedApp};
pub use config::{ConfigError, FeedConfig};
pub use desk::{DeskUpdate, NewsDesk};
pub use headline::{FilterOptions, Headline, NewsFilters};
