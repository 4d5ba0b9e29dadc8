// Database layer: read access to the Mastodon mirror database.
//
// Production reads the instance's Postgres `public_toots` relation through
// sqlx. A SQLite mirror with the same relation shape backs local runs and
// the test suite.

pub mod models;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use traits::{MirrorSession, MirrorStore};

use anyhow::Result;
use std::sync::Arc;

/// Open (or create) a SQLite mirror at `db_path`.
#[cfg(feature = "sqlite")]
pub fn open_sqlite(db_path: &str) -> Result<Arc<dyn MirrorStore>> {
    Ok(Arc::new(sqlite::SqliteMirror::open(db_path)?))
}

/// Build a lazy Postgres pool. No connection is made until the first cycle
/// opens a session, so a database outage fails that cycle, not startup.
#[cfg(feature = "postgres")]
pub fn connect_postgres(target: &postgres::PgTarget) -> Result<Arc<dyn MirrorStore>> {
    Ok(Arc::new(postgres::PgMirror::connect_lazy(target)?))
}
