// Data models: Rust structs that map to mirror database rows.
//
// These are the types that flow through the application. They're separate
// from the backends so the selection logic can use them without depending
// on sqlx or rusqlite directly.

use chrono::{DateTime, Utc};

/// Mastodon status (post) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusId(pub i64);

/// Mastodon account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub i64);

impl std::fmt::Display for StatusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A row of the mirror's `public_toots` relation.
///
/// Boosts are stored in the same relation as the posts they boost: a boost
/// is a row whose `reblog_of_id` points at the original.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: StatusId,
    pub account_id: AccountId,
    pub favourites_count: i64,
    pub updated_at: DateTime<Utc>,
    pub reblog_of_id: Option<StatusId>,
}

impl Post {
    /// True when this row is itself a boost of another post.
    pub fn is_reblog(&self) -> bool {
        self.reblog_of_id.is_some()
    }
}

/// Store-side predicates for one candidate page.
///
/// Only original posts (no boosts) with at least `min_favourites` and an
/// `updated_at` strictly between the two bounds are returned.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuery {
    pub min_favourites: i64,
    pub updated_after: DateTime<Utc>,
    pub updated_before: DateTime<Utc>,
}

/// Keyset pagination cursor. Candidates are ordered by
/// `(favourites_count DESC, id DESC)`; the next page starts strictly after
/// the last row of the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub favourites_count: i64,
    pub id: StatusId,
}

impl PageCursor {
    pub fn after(post: &Post) -> Self {
        Self {
            favourites_count: post.favourites_count,
            id: post.id,
        }
    }
}
