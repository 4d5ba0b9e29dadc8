// PgMirror: PostgreSQL backend implementing the mirror store traits.
//
// Reads the instance database's `public_toots` relation, which the operator
// provides as a view over public, local statuses with the columns:
//
//   id BIGINT, account_id BIGINT, favourites_count INTEGER,
//   updated_at TIMESTAMP (UTC, without time zone), reblog_of_id BIGINT NULL
//
// All queries use runtime parameter binding (not compile-time macros) so no
// DATABASE_URL is needed at build time. Each session owns one pooled
// connection; dropping the session hands it back to the pool.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx_core::pool::{Pool, PoolConnection, PoolOptions};
use sqlx_core::row::Row;
use sqlx_postgres::{PgConnectOptions, Postgres};

use super::models::{AccountId, CandidateQuery, PageCursor, Post, StatusId};
use super::traits::{MirrorSession, MirrorStore};

/// Type alias for the PostgreSQL connection pool.
pub type PgPool = Pool<Postgres>;

/// At most two clients; idle ones are closed after 30s.
const MAX_CONNECTIONS: u32 = 2;
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Where to find the mirror database.
#[derive(Debug, Clone, PartialEq)]
pub enum PgTarget {
    /// A full `postgres://` connection URL.
    Url(String),
    /// Individual connection parts. A `host` starting with `/` is a unix
    /// socket directory.
    Parts {
        user: String,
        password: String,
        host: String,
        port: u16,
        database: String,
    },
}

impl PgTarget {
    fn connect_options(&self) -> Result<PgConnectOptions> {
        match self {
            PgTarget::Url(url) => url
                .parse::<PgConnectOptions>()
                .context("Invalid PostgreSQL connection URL"),
            PgTarget::Parts {
                user,
                password,
                host,
                port,
                database,
            } => {
                let options = PgConnectOptions::new()
                    .username(user)
                    .database(database)
                    .port(*port);
                let options = if password.is_empty() {
                    options
                } else {
                    options.password(password)
                };
                Ok(if host.starts_with('/') {
                    options.socket(host)
                } else {
                    options.host(host)
                })
            }
        }
    }
}

pub struct PgMirror {
    pool: PgPool,
}

impl PgMirror {
    /// Build the pool without connecting.
    pub fn connect_lazy(target: &PgTarget) -> Result<Self> {
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(MAX_CONNECTIONS)
            .idle_timeout(IDLE_TIMEOUT)
            .connect_lazy_with(target.connect_options()?);
        Ok(Self { pool })
    }

    /// Build the pool and verify that a connection can be made.
    pub async fn connect(target: &PgTarget) -> Result<Self> {
        let mirror = Self::connect_lazy(target)?;
        mirror
            .pool
            .acquire()
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(mirror)
    }
}

#[async_trait]
impl MirrorStore for PgMirror {
    async fn open_session(&self) -> Result<Box<dyn MirrorSession>> {
        let conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire PostgreSQL connection")?;
        Ok(Box::new(PgSession { conn }))
    }
}

struct PgSession {
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl MirrorSession for PgSession {
    async fn average_engagement(&mut self, since: DateTime<Utc>) -> Result<Option<f64>> {
        let row = sqlx_core::query::query(
            "SELECT ceil(avg(favourites_count))::float8
             FROM public_toots
             WHERE favourites_count > 1
               AND updated_at > $1",
        )
        .bind(since.naive_utc())
        .fetch_one(&mut *self.conn)
        .await
        .context("Threshold query failed")?;
        Ok(row.get::<Option<f64>, _>(0))
    }

    async fn candidate_page(
        &mut self,
        query: &CandidateQuery,
        after: Option<PageCursor>,
        limit: u32,
    ) -> Result<Vec<Post>> {
        let rows = sqlx_core::query::query(
            "SELECT id, account_id, favourites_count::bigint, updated_at, reblog_of_id
             FROM public_toots
             WHERE reblog_of_id IS NULL
               AND favourites_count >= $1
               AND updated_at > $2
               AND updated_at < $3
               AND ($4::bigint IS NULL
                    OR favourites_count < $4
                    OR (favourites_count = $4 AND id < $5))
             ORDER BY favourites_count DESC, id DESC
             LIMIT $6",
        )
        .bind(query.min_favourites)
        .bind(query.updated_after.naive_utc())
        .bind(query.updated_before.naive_utc())
        .bind(after.map(|c| c.favourites_count))
        .bind(after.map(|c| c.id.0))
        .bind(i64::from(limit))
        .fetch_all(&mut *self.conn)
        .await
        .context("Candidate query failed")?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            let updated_at: NaiveDateTime = row.get(3);
            posts.push(Post {
                id: StatusId(row.get(0)),
                account_id: AccountId(row.get(1)),
                favourites_count: row.get(2),
                updated_at: updated_at.and_utc(),
                reblog_of_id: row.get::<Option<i64>, _>(4).map(StatusId),
            });
        }
        Ok(posts)
    }

    async fn reposted_among(
        &mut self,
        account: AccountId,
        ids: &[StatusId],
    ) -> Result<HashSet<StatusId>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx_core::query::query(
            "SELECT DISTINCT reblog_of_id
             FROM public_toots
             WHERE account_id = $1
               AND reblog_of_id = ANY($2)",
        )
        .bind(account.0)
        .bind(raw)
        .fetch_all(&mut *self.conn)
        .await
        .context("Duplicate boost lookup failed")?;

        Ok(rows
            .iter()
            .map(|r| StatusId(r.get::<i64, _>(0)))
            .collect())
    }

    async fn repost_counts_by_source(
        &mut self,
        account: AccountId,
        since: DateTime<Utc>,
    ) -> Result<HashMap<AccountId, i64>> {
        let rows = sqlx_core::query::query(
            "SELECT original.account_id, COUNT(*)::bigint
             FROM public_toots AS boost
             JOIN public_toots AS original ON original.id = boost.reblog_of_id
             WHERE boost.account_id = $1
               AND boost.updated_at > $2
             GROUP BY original.account_id",
        )
        .bind(account.0)
        .bind(since.naive_utc())
        .fetch_all(&mut *self.conn)
        .await
        .context("Per-account boost count query failed")?;

        Ok(rows
            .iter()
            .map(|r| (AccountId(r.get::<i64, _>(0)), r.get::<i64, _>(1)))
            .collect())
    }
}
