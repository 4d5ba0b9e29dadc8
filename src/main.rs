use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use ambassador::config::Config;
use ambassador::cycle::{self, Ambassador};
use ambassador::db::MirrorStore;
use ambassador::mastodon::client::MastodonClient;

/// Ambassador: boosts the most-favourited recent public posts of a
/// Mastodon instance from a dedicated account.
#[derive(Parser)]
#[command(name = "ambassador", version, about)]
struct Cli {
    /// Run a single cycle and exit instead of scheduling forever
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ambassador=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::load()?;
    config.require_api()?;
    config.log_summary();

    let store = open_store(&config)?;
    let client = MastodonClient::new(
        &config.instance_host,
        &config.access_token,
        config.http_timeout(),
    )?;

    let mut ambassador = Ambassador::new(
        store,
        Arc::new(client),
        config.threshold_settings(),
        config.selection_settings(),
        config.boosts_per_cycle,
    );

    if cli.once {
        let report = ambassador.run_cycle().await?;
        info!(
            selected = report.selected.len(),
            reblogged = report.reposts.reblogged,
            "Single cycle finished"
        );
        return Ok(());
    }

    cycle::run_forever(
        &mut ambassador,
        config.cycle_interval(),
        config.failure_policy(),
    )
    .await
}

/// Pick the mirror backend. A `sqlite:` DATABASE_URL opens a local file;
/// anything else is PostgreSQL, from the URL or the DB_* parts.
fn open_store(config: &Config) -> Result<Arc<dyn MirrorStore>> {
    if let Some(path) = config.database_url.as_deref().and_then(sqlite_path) {
        #[cfg(feature = "sqlite")]
        {
            info!(path, "Using SQLite mirror");
            return ambassador::db::open_sqlite(path);
        }
        #[cfg(not(feature = "sqlite"))]
        anyhow::bail!(
            "DATABASE_URL points to SQLite ({path}) but the 'sqlite' feature is not compiled in.\n\
             Rebuild with: cargo build --features sqlite"
        );
    }

    #[cfg(feature = "postgres")]
    {
        use ambassador::db::postgres::PgTarget;

        let target = match config.database_url.clone() {
            Some(url) => PgTarget::Url(url),
            None => PgTarget::Parts {
                user: config.db_user.clone(),
                password: config.db_password.clone(),
                host: config.db_host.clone(),
                port: config.db_port,
                database: config.db_name.clone(),
            },
        };
        info!("Using PostgreSQL mirror");
        ambassador::db::connect_postgres(&target)
    }
    #[cfg(not(feature = "postgres"))]
    anyhow::bail!(
        "The mirror is PostgreSQL but the 'postgres' feature is not compiled in.\n\
         Rebuild with: cargo build --features postgres"
    )
}

fn sqlite_path(url: &str) -> Option<&str> {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
}
