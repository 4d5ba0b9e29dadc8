// Mirror store traits: backend-agnostic async interface for the reads the
// boost cycle makes against the mirror database.
//
// Implementors: PgMirror (sqlx, production) and SqliteMirror (rusqlite,
// local mirror and tests). A cycle opens exactly one session and does all
// of its reads through it; dropping the session releases the connection.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{AccountId, CandidateQuery, PageCursor, Post, StatusId};

#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Acquire a session (one connection) for the duration of a cycle.
    async fn open_session(&self) -> Result<Box<dyn MirrorSession>>;
}

#[async_trait]
pub trait MirrorSession: Send {
    /// `ceil(avg(favourites_count))` over posts with more than one favourite
    /// updated after `since`. `None` when no post qualifies.
    async fn average_engagement(&mut self, since: DateTime<Utc>) -> Result<Option<f64>>;

    /// One page of original posts matching `query`, ordered by
    /// `(favourites_count DESC, id DESC)`, starting after `after`.
    async fn candidate_page(
        &mut self,
        query: &CandidateQuery,
        after: Option<PageCursor>,
        limit: u32,
    ) -> Result<Vec<Post>>;

    /// The subset of `ids` that `account` has already boosted.
    async fn reposted_among(
        &mut self,
        account: AccountId,
        ids: &[StatusId],
    ) -> Result<HashSet<StatusId>>;

    /// Boosts made by `account` and updated after `since`, counted per
    /// author of the boosted original.
    async fn repost_counts_by_source(
        &mut self,
        account: AccountId,
        since: DateTime<Utc>,
    ) -> Result<HashMap<AccountId, i64>>;
}
