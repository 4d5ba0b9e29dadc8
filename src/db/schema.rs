// SQLite mirror schema: the `public_toots` relation in the shape the
// Postgres mirror exposes it.
//
// Timestamps are stored as unix seconds so range comparisons stay numeric.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create the mirror tables if they don't exist yet.
///
/// This is idempotent and safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Public posts and boosts. A boost is a row whose reblog_of_id
        -- points at the boosted original.
        CREATE TABLE IF NOT EXISTS public_toots (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            favourites_count INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL,           -- unix seconds, UTC
            reblog_of_id INTEGER
        );

        -- Candidate scan: popularity first, then recency
        CREATE INDEX IF NOT EXISTS idx_toots_favourites
            ON public_toots(favourites_count DESC, id DESC);

        -- Duplicate and rate-limit lookups over the controlled account's boosts
        CREATE INDEX IF NOT EXISTS idx_toots_reblogs
            ON public_toots(account_id, reblog_of_id);

        CREATE INDEX IF NOT EXISTS idx_toots_updated
            ON public_toots(updated_at);
        ",
    )
    .context("Failed to create mirror tables")?;

    Ok(())
}
