//! Headline store fed by batches from the client

use super::headline::{FilterOptions, Headline, NewsFilters};
use resocket::FeedMessage;
use std::collections::VecDeque;

/// Result of ingesting one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeskUpdate {
    pub added: usize,
    pub skipped: usize,
    /// A new source, asset or keyword appeared
    pub options_changed: bool,
}

/// Newest-first headline store with the filter values seen so far
#[derive(Debug)]
pub struct NewsDesk {
    headlines: VecDeque<Headline>,
    capacity: usize,
    options: FilterOptions,
    high_priority: u64,
}

impl NewsDesk {
    pub fn new(capacity: usize) -> Self {
        Self {
            headlines: VecDeque::new(),
            capacity: capacity.max(1),
            options: FilterOptions::default(),
            high_priority: 0,
        }
    }

    /// Ingest a batch that is already newest-first.
    ///
    /// The whole batch goes in front of what is stored; the oldest
    /// headlines fall off once capacity is reached.
    pub fn ingest(&mut self, batch: &[FeedMessage]) -> DeskUpdate {
        let decoded: Vec<Headline> = batch.iter().filter_map(Headline::from_message).collect();

        let update = DeskUpdate {
            added: decoded.len(),
            skipped: batch.len() - decoded.len(),
            options_changed: self.options.absorb(&decoded),
        };

        self.high_priority += decoded.iter().filter(|h| h.is_high_priority()).count() as u64;
        for headline in decoded.into_iter().rev() {
            self.headlines.push_front(headline);
        }
        self.headlines.truncate(self.capacity);

        update
    }

    pub fn len(&self) -> usize {
        self.headlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headlines.is_empty()
    }

    pub fn latest(&self) -> Option<&Headline> {
        self.headlines.front()
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// High-priority headlines seen since start
    pub fn high_priority_count(&self) -> u64 {
        self.high_priority
    }

    /// Stored headlines matching `filters`, newest first
    pub fn view<'a>(&'a self, filters: &'a NewsFilters) -> impl Iterator<Item = &'a Headline> + 'a {
        self.headlines.iter().filter(move |h| filters.matches(h))
    }
}
