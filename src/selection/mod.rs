// Candidate selection: pick the most-favourited posts that the controlled
// account may boost this cycle.
//
// Candidates are read from the mirror a page at a time, most favourited
// first. The store narrows each page by popularity and age; duplicate boosts
// are resolved with one lookup per page, and the per-source boost counts are
// loaded once up front. Every candidate then goes through the filter chain,
// and the first `batch_size` survivors are returned.

pub mod filters;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::db::models::{AccountId, CandidateQuery, PageCursor, StatusId};
use crate::db::MirrorSession;
use crate::threshold::Threshold;
use filters::{
    first_rejection, CandidateFilter, Freshness, NotYetReposted, Popularity, SourceRateLimit,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSettings {
    /// Oldest a candidate may be.
    pub max_age: Duration,
    /// Youngest a candidate may be, so engagement has time to settle.
    pub min_age: Duration,
    /// Boosts allowed per source account inside `source_window`.
    pub source_limit: i64,
    pub source_window: Duration,
    /// Rows fetched per candidate page.
    pub page_size: u32,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            max_age: Duration::days(5),
            min_age: Duration::hours(12),
            source_limit: 3,
            source_window: Duration::hours(24),
            page_size: 50,
        }
    }
}

pub struct Selector {
    settings: SelectionSettings,
}

impl Selector {
    pub fn new(settings: SelectionSettings) -> Self {
        Self { settings }
    }

    /// Select up to `batch_size` posts for `booster` to boost, ordered by
    /// descending favourite count.
    ///
    /// Read-only. Store errors are returned as-is; nothing is retried.
    pub async fn select(
        &self,
        session: &mut dyn MirrorSession,
        threshold: &Threshold,
        booster: AccountId,
        batch_size: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatusId>> {
        let mut selected = Vec::new();
        if batch_size == 0 {
            return Ok(selected);
        }

        let popularity = Popularity::new(threshold);
        let freshness = Freshness::new(now, self.settings.max_age, self.settings.min_age);
        if freshness.is_empty() {
            warn!(
                max_age_hours = self.settings.max_age.num_hours(),
                min_age_hours = self.settings.min_age.num_hours(),
                "Freshness window is empty, nothing can be selected"
            );
            return Ok(selected);
        }

        let recent = session
            .repost_counts_by_source(booster, now - self.settings.source_window)
            .await?;
        let mut rate_limit = SourceRateLimit::new(self.settings.source_limit, recent);
        let mut not_reposted = NotYetReposted::default();

        let query = CandidateQuery {
            min_favourites: popularity.min_favourites,
            updated_after: freshness.updated_after,
            updated_before: freshness.updated_before,
        };
        let page_size = self.settings.page_size.max(1);
        let mut cursor: Option<PageCursor> = None;
        let mut pages = 0usize;

        loop {
            let page = session.candidate_page(&query, cursor, page_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(PageCursor::after(last));
            pages += 1;

            let ids: Vec<StatusId> = page.iter().map(|p| p.id).collect();
            not_reposted.extend(session.reposted_among(booster, &ids).await?);

            for post in &page {
                let filters: [&dyn CandidateFilter; 4] =
                    [&popularity, &freshness, &not_reposted, &rate_limit];
                if let Some(reason) = first_rejection(&filters, post) {
                    debug!(
                        status_id = %post.id,
                        account_id = %post.account_id,
                        favourites = post.favourites_count,
                        reason,
                        "Candidate rejected"
                    );
                    continue;
                }

                not_reposted.record_selected(post);
                rate_limit.record_selected(post);
                selected.push(post.id);

                if selected.len() >= batch_size {
                    info!(pages, selected = selected.len(), "Selection complete");
                    return Ok(selected);
                }
            }

            if page.len() < page_size as usize {
                break;
            }
        }

        info!(pages, selected = selected.len(), "Selection complete");
        Ok(selected)
    }
}
