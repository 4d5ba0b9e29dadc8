// SqliteMirror: rusqlite backend implementing the mirror store traits.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// A session holds the owned guard for the whole cycle, so every read in a
// cycle goes through the same connection and other sessions wait their turn.
// The query functions below are synchronous and never hold anything across
// an .await point.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::models::{AccountId, CandidateQuery, PageCursor, Post, StatusId};
use super::schema;
use super::traits::{MirrorSession, MirrorStore};

pub struct SqliteMirror {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMirror {
    /// Open (or create) a mirror database file and ensure the schema exists.
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory for database: {}", db_path)
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        // Enable WAL mode so a mirror writer doesn't block our reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        schema::create_tables(&conn)?;
        Ok(Self::new(conn))
    }

    /// An empty in-memory mirror.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        schema::create_tables(&conn)?;
        Ok(Self::new(conn))
    }

    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Insert or replace a row in `public_toots`.
    ///
    /// Waits for any open session to be dropped first.
    pub async fn insert_post(&self, post: &Post) -> Result<()> {
        let conn = self.conn.lock().await;
        insert_post(&conn, post)
    }
}

#[async_trait]
impl MirrorStore for SqliteMirror {
    async fn open_session(&self) -> Result<Box<dyn MirrorSession>> {
        let conn = self.conn.clone().lock_owned().await;
        Ok(Box::new(SqliteSession { conn }))
    }
}

struct SqliteSession {
    conn: OwnedMutexGuard<Connection>,
}

#[async_trait]
impl MirrorSession for SqliteSession {
    async fn average_engagement(&mut self, since: DateTime<Utc>) -> Result<Option<f64>> {
        average_engagement(&self.conn, since)
    }

    async fn candidate_page(
        &mut self,
        query: &CandidateQuery,
        after: Option<PageCursor>,
        limit: u32,
    ) -> Result<Vec<Post>> {
        candidate_page(&self.conn, query, after, limit)
    }

    async fn reposted_among(
        &mut self,
        account: AccountId,
        ids: &[StatusId],
    ) -> Result<HashSet<StatusId>> {
        reposted_among(&self.conn, account, ids)
    }

    async fn repost_counts_by_source(
        &mut self,
        account: AccountId,
        since: DateTime<Utc>,
    ) -> Result<HashMap<AccountId, i64>> {
        repost_counts_by_source(&self.conn, account, since)
    }
}

// --- Queries ---

fn insert_post(conn: &Connection, post: &Post) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO public_toots
            (id, account_id, favourites_count, updated_at, reblog_of_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            post.id.0,
            post.account_id.0,
            post.favourites_count,
            post.updated_at.timestamp(),
            post.reblog_of_id.map(|id| id.0),
        ],
    )?;
    Ok(())
}

fn average_engagement(conn: &Connection, since: DateTime<Utc>) -> Result<Option<f64>> {
    // SQLite's ceil() depends on compile-time math functions, so round up here.
    let avg: Option<f64> = conn.query_row(
        "SELECT avg(favourites_count) FROM public_toots
         WHERE favourites_count > 1 AND updated_at > ?1",
        params![since.timestamp()],
        |row| row.get(0),
    )?;
    Ok(avg.map(f64::ceil))
}

fn candidate_page(
    conn: &Connection,
    query: &CandidateQuery,
    after: Option<PageCursor>,
    limit: u32,
) -> Result<Vec<Post>> {
    let mut stmt = conn.prepare(
        "SELECT id, account_id, favourites_count, updated_at, reblog_of_id
         FROM public_toots
         WHERE reblog_of_id IS NULL
           AND favourites_count >= ?1
           AND updated_at > ?2
           AND updated_at < ?3
           AND (?4 IS NULL
                OR favourites_count < ?4
                OR (favourites_count = ?4 AND id < ?5))
         ORDER BY favourites_count DESC, id DESC
         LIMIT ?6",
    )?;

    let rows = stmt.query_map(
        params![
            query.min_favourites,
            query.updated_after.timestamp(),
            query.updated_before.timestamp(),
            after.map(|c| c.favourites_count),
            after.map(|c| c.id.0),
            limit,
        ],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<i64>>(4)?,
            ))
        },
    )?;

    let mut posts = Vec::new();
    for row in rows {
        let (id, account_id, favourites_count, updated_at, reblog_of_id) = row?;
        let updated_at = DateTime::from_timestamp(updated_at, 0)
            .with_context(|| format!("Post {id} has an out-of-range updated_at: {updated_at}"))?;
        posts.push(Post {
            id: StatusId(id),
            account_id: AccountId(account_id),
            favourites_count,
            updated_at,
            reblog_of_id: reblog_of_id.map(StatusId),
        });
    }
    Ok(posts)
}

fn reposted_among(
    conn: &Connection,
    account: AccountId,
    ids: &[StatusId],
) -> Result<HashSet<StatusId>> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT DISTINCT reblog_of_id FROM public_toots
         WHERE account_id = ? AND reblog_of_id IN ({placeholders})"
    );
    let mut stmt = conn.prepare(&sql)?;

    let bound = std::iter::once(account.0).chain(ids.iter().map(|id| id.0));
    let rows = stmt.query_map(params_from_iter(bound), |row| row.get::<_, i64>(0))?;

    let mut reposted = HashSet::new();
    for row in rows {
        reposted.insert(StatusId(row?));
    }
    Ok(reposted)
}

fn repost_counts_by_source(
    conn: &Connection,
    account: AccountId,
    since: DateTime<Utc>,
) -> Result<HashMap<AccountId, i64>> {
    let mut stmt = conn.prepare(
        "SELECT original.account_id, COUNT(*)
         FROM public_toots AS boost
         JOIN public_toots AS original ON original.id = boost.reblog_of_id
         WHERE boost.account_id = ?1
           AND boost.updated_at > ?2
         GROUP BY original.account_id",
    )?;

    let rows = stmt.query_map(params![account.0, since.timestamp()], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = HashMap::new();
    for row in rows {
        let (source, count) = row?;
        counts.insert(AccountId(source), count);
    }
    Ok(counts)
}
