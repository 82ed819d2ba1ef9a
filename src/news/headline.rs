//! Headline model and filtering

use chrono::{DateTime, Utc};
use resocket::FeedMessage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// A single news item as published by the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub id: String,
    pub source: String,
    pub headline: String,
    #[serde(default)]
    pub assets: Vec<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Publish time in epoch milliseconds
    pub timestamp: i64,
    /// "high" for breaking items
    #[serde(default)]
    pub priority: Option<String>,
}

impl Headline {
    /// Decode a feed message, deduplicating assets and keywords.
    ///
    /// Returns `None` for messages that are not headlines.
    pub fn from_message(message: &FeedMessage) -> Option<Self> {
        let body = serde_json::Value::Object(message.body.clone());
        match serde_json::from_value::<Headline>(body) {
            Ok(mut headline) => {
                headline.dedupe();
                Some(headline)
            }
            Err(e) => {
                debug!("Skipping {} message: {}", message.kind, e);
                None
            }
        }
    }

    /// Remove repeated assets and keywords, keeping first occurrences
    pub fn dedupe(&mut self) {
        dedupe_in_place(&mut self.assets);
        dedupe_in_place(&mut self.keywords);
    }

    pub fn is_high_priority(&self) -> bool {
        self.priority.as_deref() == Some("high")
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

fn dedupe_in_place(values: &mut Vec<String>) {
    let mut seen = BTreeSet::new();
    values.retain(|value| seen.insert(value.clone()));
}

/// Sorted, distinct filter values seen so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub sources: BTreeSet<String>,
    pub assets: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
}

impl FilterOptions {
    /// Fold a batch in; returns true if any new value appeared
    pub fn absorb<'a>(&mut self, headlines: impl IntoIterator<Item = &'a Headline>) -> bool {
        let mut changed = false;
        for headline in headlines {
            changed |= self.sources.insert(headline.source.clone());
            for asset in &headline.assets {
                changed |= self.assets.insert(asset.clone());
            }
            for keyword in &headline.keywords {
                changed |= self.keywords.insert(keyword.clone());
            }
        }
        changed
    }
}

/// Active filters; an empty set matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsFilters {
    #[serde(default)]
    pub sources: BTreeSet<String>,
    #[serde(default)]
    pub assets: BTreeSet<String>,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
}

impl NewsFilters {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.assets.is_empty() && self.keywords.is_empty()
    }

    pub fn matches(&self, headline: &Headline) -> bool {
        (self.sources.is_empty() || self.sources.contains(&headline.source))
            && (self.keywords.is_empty()
                || headline.keywords.iter().any(|k| self.keywords.contains(k)))
            && (self.assets.is_empty() || headline.assets.iter().any(|a| self.assets.contains(a)))
    }
}
