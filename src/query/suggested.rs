//! Budget and exclusion bookkeeping for suggested topics.
//!
//! The builder never queries anything itself: the caller runs one tier at a time,
//! asks the builder how many results the next tier may contribute and which ids it
//! must leave out, and hands the tier's topics back through
//! [`SuggestedTopicsBuilder::add_results`].

use std::collections::HashSet;

use serde::Serialize;

use crate::config::ListSettings;
use crate::db::Topic;

/// Candidate-producing passes, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionTier {
    Unread,
    New,
    Random,
}

impl SuggestionTier {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::New => "new",
            Self::Random => "random",
        }
    }
}

/// How many topics a tier contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierOutcome {
    pub tier: SuggestionTier,
    pub merged: usize,
}

#[derive(Debug)]
pub struct SuggestedTopicsBuilder {
    source_category_id: Option<i64>,
    excluded: HashSet<i64>,
    results: Vec<Topic>,
    remaining: u32,
    category_remaining: u32,
    tiers: Vec<TierOutcome>,
}

impl SuggestedTopicsBuilder {
    #[must_use]
    pub fn new(source: &Topic, settings: &ListSettings) -> Self {
        Self {
            source_category_id: source.category_id,
            excluded: HashSet::from([source.id]),
            results: Vec::new(),
            remaining: settings.suggested_topics,
            category_remaining: settings
                .suggested_category_topics
                .min(settings.suggested_topics),
            tiers: Vec::new(),
        }
    }

    #[must_use]
    pub fn source_category_id(&self) -> Option<i64> {
        self.source_category_id
    }

    /// Merge one tier's topics in order, skipping ids already present and
    /// stopping at the budget. Returns how many were merged.
    pub fn add_results(&mut self, tier: SuggestionTier, topics: Vec<Topic>) -> usize {
        let mut merged = 0;
        for topic in topics {
            if self.is_full() {
                break;
            }
            if !self.excluded.insert(topic.id) {
                continue;
            }
            self.results.push(topic);
            self.remaining -= 1;
            self.category_remaining = self.category_remaining.saturating_sub(1);
            merged += 1;
        }
        self.tiers.push(TierOutcome { tier, merged });
        merged
    }

    #[must_use]
    pub fn results_left(&self) -> u32 {
        self.remaining
    }

    /// Budget for the "new" tier, never more than the overall remainder.
    #[must_use]
    pub fn category_results_left(&self) -> u32 {
        self.category_remaining.min(self.remaining)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.remaining == 0
    }

    /// Ids the next tier must not return, sorted for a stable query.
    #[must_use]
    pub fn excluded_topic_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.excluded.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn into_results(self) -> (Vec<Topic>, Vec<TierOutcome>) {
        (self.results, self.tiers)
    }
}
