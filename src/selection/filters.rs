// Eligibility filters: one type per constraint a candidate must satisfy.
//
// The store already applies the cheap predicates in SQL; these filters are
// the authoritative check and keep each constraint testable on its own.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::db::models::{AccountId, Post, StatusId};
use crate::threshold::Threshold;

/// A single eligibility constraint.
pub trait CandidateFilter {
    /// Short name used when logging why a candidate was dropped.
    fn name(&self) -> &'static str;

    /// Whether `post` satisfies this constraint.
    fn admits(&self, post: &Post) -> bool;

    /// Called once a candidate has passed every filter and been selected.
    /// Stateful filters use this to account for picks made in the same run.
    fn record_selected(&mut self, _post: &Post) {}
}

/// Name of the first filter that rejects `post`, if any.
pub fn first_rejection(filters: &[&dyn CandidateFilter], post: &Post) -> Option<&'static str> {
    filters
        .iter()
        .find(|filter| !filter.admits(post))
        .map(|filter| filter.name())
}

/// Enough favourites to clear the threshold.
#[derive(Debug, Clone, Copy)]
pub struct Popularity {
    pub min_favourites: i64,
}

impl Popularity {
    pub fn new(threshold: &Threshold) -> Self {
        Self {
            min_favourites: threshold.min_favourites(),
        }
    }
}

impl CandidateFilter for Popularity {
    fn name(&self) -> &'static str {
        "popularity"
    }

    fn admits(&self, post: &Post) -> bool {
        post.favourites_count >= self.min_favourites
    }
}

/// Old enough to have settled, young enough to still be relevant.
///
/// Both bounds are exclusive.
#[derive(Debug, Clone, Copy)]
pub struct Freshness {
    pub updated_after: DateTime<Utc>,
    pub updated_before: DateTime<Utc>,
}

impl Freshness {
    pub fn new(now: DateTime<Utc>, max_age: Duration, min_age: Duration) -> Self {
        Self {
            updated_after: now - max_age,
            updated_before: now - min_age,
        }
    }

    /// True when no timestamp can satisfy both bounds.
    pub fn is_empty(&self) -> bool {
        self.updated_after >= self.updated_before
    }
}

impl CandidateFilter for Freshness {
    fn name(&self) -> &'static str {
        "freshness"
    }

    fn admits(&self, post: &Post) -> bool {
        post.updated_at > self.updated_after && post.updated_at < self.updated_before
    }
}

/// Not boosted by the controlled account already, and not itself a boost.
#[derive(Debug, Clone, Default)]
pub struct NotYetReposted {
    reposted: HashSet<StatusId>,
}

impl NotYetReposted {
    pub fn extend(&mut self, ids: impl IntoIterator<Item = StatusId>) {
        self.reposted.extend(ids);
    }
}

impl CandidateFilter for NotYetReposted {
    fn name(&self) -> &'static str {
        "already-reposted"
    }

    fn admits(&self, post: &Post) -> bool {
        !post.is_reblog() && !self.reposted.contains(&post.id)
    }

    fn record_selected(&mut self, post: &Post) {
        self.reposted.insert(post.id);
    }
}

/// Caps how many posts from one source account are boosted per window.
///
/// `counts` starts as the boosts already made inside the window and grows
/// as candidates from the same run are selected.
#[derive(Debug, Clone)]
pub struct SourceRateLimit {
    limit: i64,
    counts: HashMap<AccountId, i64>,
}

impl SourceRateLimit {
    pub fn new(limit: i64, counts: HashMap<AccountId, i64>) -> Self {
        Self { limit, counts }
    }

    pub fn count_for(&self, account: AccountId) -> i64 {
        self.counts.get(&account).copied().unwrap_or(0)
    }
}

impl CandidateFilter for SourceRateLimit {
    fn name(&self) -> &'static str {
        "source-rate-limit"
    }

    fn admits(&self, post: &Post) -> bool {
        self.count_for(post.account_id) < self.limit
    }

    fn record_selected(&mut self, post: &Post) {
        *self.counts.entry(post.account_id).or_insert(0) += 1;
    }
}
