use crate::{
    error::{Result, ShortenError},
    models::{Resolved, UrlMapping},
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::time::Duration;

/// Upper bound on how long a statement waits for a competing writer's lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ── Bootstrap ──────────────────────────────────────────────────────────────

/// Open a pool for a `sqlite:` connection string and apply migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = database_url.parse::<SqliteConnectOptions>()?;
    connect_with(options, max_connections).await
}

/// Open a pool from explicit options. The database file is created if it
/// doesn't exist yet.
pub async fn connect_with(
    options: SqliteConnectOptions,
    max_connections: u32,
) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(
            options
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(BUSY_TIMEOUT),
        )
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

// ── Lookups ────────────────────────────────────────────────────────────────

/// Fetch the short key already assigned to this exact URL, if any.
pub async fn find_key_by_url(
    pool: &SqlitePool,
    long_url: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT short_key FROM urls WHERE long_url = ?1")
        .bind(long_url)
        .fetch_optional(pool)
        .await
}

/// `true` if some mapping already uses `short_key`.
pub async fn key_exists(pool: &SqlitePool, short_key: &str) -> Result<bool, sqlx::Error> {
    let found: i64 =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM urls WHERE short_key = ?1)")
            .bind(short_key)
            .fetch_one(pool)
            .await?;

    Ok(found != 0)
}

/// Fetch a full row by short key without touching the visit counter.
pub async fn get_mapping(
    pool: &SqlitePool,
    short_key: &str,
) -> Result<Option<UrlMapping>, sqlx::Error> {
    sqlx::query_as::<_, UrlMapping>(
        "SELECT short_key, long_url, created_at, visit_count
         FROM urls WHERE short_key = ?1",
    )
    .bind(short_key)
    .fetch_optional(pool)
    .await
}

/// Number of rows stored for a URL. Always 0 or 1 given the unique index.
pub async fn count_mappings_for_url(pool: &SqlitePool, long_url: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM urls WHERE long_url = ?1")
        .bind(long_url)
        .fetch_one(pool)
        .await
}

// ── Writes ─────────────────────────────────────────────────────────────────

/// What `insert_mapping` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written with the candidate key.
    Created(String),
    /// Another writer already stored this URL; its key is returned.
    Existing(String),
}

impl InsertOutcome {
    pub fn short_key(&self) -> &str {
        match self {
            InsertOutcome::Created(key) | InsertOutcome::Existing(key) => key,
        }
    }

    pub fn into_short_key(self) -> String {
        match self {
            InsertOutcome::Created(key) | InsertOutcome::Existing(key) => key,
        }
    }
}

/// Insert a new mapping, or fetch the existing one for the same URL.
///
/// Runs in a single transaction. A conflict on `long_url` keeps the first
/// row. A conflict on `short_key` rolls back and returns
/// [`ShortenError::DuplicateKey`].
pub async fn insert_mapping(
    pool: &SqlitePool,
    short_key: &str,
    long_url: &str,
) -> Result<InsertOutcome> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query_scalar::<_, String>(
        "INSERT INTO urls (short_key, long_url) VALUES (?1, ?2)
         ON CONFLICT (long_url) DO NOTHING
         RETURNING short_key",
    )
    .bind(short_key)
    .bind(long_url)
    .fetch_optional(&mut *tx)
    .await;

    let outcome = match inserted {
        Ok(Some(key)) => InsertOutcome::Created(key),
        Ok(None) => {
            let key = sqlx::query_scalar::<_, String>(
                "SELECT short_key FROM urls WHERE long_url = ?1",
            )
            .bind(long_url)
            .fetch_one(&mut *tx)
            .await?;
            InsertOutcome::Existing(key)
        }
        // Dropping `tx` rolls the transaction back.
        Err(e) if is_unique_violation(&e) => {
            return Err(ShortenError::DuplicateKey(short_key.to_owned()));
        }
        Err(e) => return Err(e.into()),
    };

    tx.commit().await?;
    Ok(outcome)
}

/// Bump the visit counter and return the target with the new count, in one
/// statement.
///
/// The increment is committed before this returns, so any connection that
/// reads the row afterwards sees the returned count.
pub async fn increment_visits(
    pool: &SqlitePool,
    short_key: &str,
) -> Result<Option<Resolved>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // At most one row (primary key); drain it so the statement finishes before COMMIT.
    let resolved = sqlx::query_as::<_, Resolved>(
        "UPDATE urls SET visit_count = visit_count + 1
         WHERE short_key = ?1
         RETURNING long_url, visit_count",
    )
    .bind(short_key)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .next();

    tx.commit().await?;
    Ok(resolved)
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// SQLite reports primary-key conflicts as 1555 and unique-index conflicts as
/// 2067. Inside `insert_mapping` only `short_key` can raise either, since the
/// `long_url` index is handled by `ON CONFLICT`.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err.as_database_error() {
        Some(db_err) => {
            db_err.is_unique_violation()
                || matches!(db_err.code().as_deref(), Some("1555") | Some("2067"))
        }
        None => false,
    }
}
