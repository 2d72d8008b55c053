use crate::{
    db::{self, InsertOutcome},
    error::{Result, ShortenError},
    keygen::{self, KeyLookup},
    models::{Resolved, UrlStats},
};
use async_trait::async_trait;
use sqlx::SqlitePool;
use url::Url;

/// Generate-then-insert cycles attempted before `shorten` gives up on
/// repeated `DuplicateKey` conflicts.
pub const MAX_INSERT_ATTEMPTS: usize = 3;

/// The mapping store: shorten, resolve and stats over the `urls` table.
///
/// Every call is a direct round-trip to the database; uniqueness of both
/// `short_key` and `long_url` is enforced there, so any number of clones may
/// be used concurrently.
#[derive(Clone, Debug)]
pub struct Shortener {
    pool: SqlitePool,
}

impl Shortener {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Return the short key for `long_url`, creating the mapping on first use.
    ///
    /// Idempotent: an existing mapping for the exact URL string is returned
    /// unchanged.
    pub async fn shorten(&self, long_url: &str) -> Result<String> {
        self.shorten_with(long_url, self).await
    }

    pub(crate) async fn shorten_with<L>(&self, long_url: &str, lookup: &L) -> Result<String>
    where
        L: KeyLookup + ?Sized,
    {
        validate_long_url(long_url)?;
        tracing::info!("Attempting to shorten URL: {}", long_url);

        for attempt in 1..=MAX_INSERT_ATTEMPTS {
            if let Some(key) = db::find_key_by_url(&self.pool, long_url).await? {
                tracing::debug!("Existing short key '{}' found for {}", key, long_url);
                return Ok(key);
            }

            let candidate = keygen::generate_key(long_url, lookup).await?;

            match db::insert_mapping(&self.pool, &candidate, long_url).await {
                Ok(outcome @ InsertOutcome::Created(_)) => {
                    tracing::info!("URL shortened: {} -> {}", long_url, outcome.short_key());
                    return Ok(outcome.into_short_key());
                }
                Ok(outcome @ InsertOutcome::Existing(_)) => {
                    tracing::debug!(
                        "URL {} was stored concurrently as '{}'",
                        long_url,
                        outcome.short_key()
                    );
                    return Ok(outcome.into_short_key());
                }
                Err(ShortenError::DuplicateKey(key)) => {
                    tracing::warn!(
                        "Short key '{}' was claimed concurrently (attempt {}/{}); regenerating",
                        key,
                        attempt,
                        MAX_INSERT_ATTEMPTS
                    );
                }
                Err(e) => {
                    tracing::error!("Error storing URL {}: {:?}", long_url, e);
                    return Err(e);
                }
            }
        }

        Err(ShortenError::KeyGenerationExhausted {
            attempts: MAX_INSERT_ATTEMPTS,
        })
    }

    /// Count a visit and return the target URL with the post-increment count.
    pub async fn resolve(&self, short_key: &str) -> Result<Resolved> {
        tracing::info!("Looking up short key: {}", short_key);

        match db::increment_visits(&self.pool, short_key).await? {
            Some(resolved) => {
                tracing::info!("Retrieved URL for {}: {}", short_key, resolved.long_url);
                Ok(resolved)
            }
            None => {
                tracing::warn!("Short key not found: {}", short_key);
                Err(ShortenError::NotFound(short_key.to_owned()))
            }
        }
    }

    /// Read a mapping's statistics without counting a visit.
    pub async fn stats(&self, short_key: &str) -> Result<UrlStats> {
        match db::get_mapping(&self.pool, short_key).await? {
            Some(mapping) => Ok(mapping.into()),
            None => {
                tracing::warn!("No stats found for short key: {}", short_key);
                Err(ShortenError::NotFound(short_key.to_owned()))
            }
        }
    }
}

#[async_trait]
impl KeyLookup for Shortener {
    async fn exists(&self, candidate: &str) -> Result<bool> {
        Ok(db::key_exists(&self.pool, candidate).await?)
    }
}

/// Reject anything that is not an absolute URL with both a scheme and a host.
pub fn validate_long_url(long_url: &str) -> Result<()> {
    if long_url.trim().is_empty() {
        return Err(ShortenError::InvalidInput("URL must not be empty".into()));
    }

    let parsed = Url::parse(long_url)
        .map_err(|e| ShortenError::InvalidInput(format!("{long_url}: {e}")))?;

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ShortenError::InvalidInput(format!(
            "{long_url}: missing host"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::sqlite::SqliteConnectOptions;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    const URL_A: &str = "https://example.com/a";

    /// Fresh store backed by a temporary SQLite file.
    async fn create_temp_shortener() -> (Shortener, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let options = SqliteConnectOptions::new().filename(temp_dir.path().join("test.db"));
        let pool = db::connect_with(options, 5)
            .await
            .expect("Failed to open test database");
        (Shortener::new(pool), temp_dir)
    }

    /// Reports every candidate as free, hiding rows that really exist.
    struct AlwaysFree;

    #[async_trait]
    impl KeyLookup for AlwaysFree {
        async fn exists(&self, _candidate: &str) -> Result<bool> {
            Ok(false)
        }
    }

    /// Reports the first candidate as free, then answers truthfully. Simulates
    /// a writer that claims the key between the check and the insert.
    struct StaleOnce<'a> {
        store: &'a Shortener,
        used: AtomicBool,
    }

    #[async_trait]
    impl KeyLookup for StaleOnce<'_> {
        async fn exists(&self, candidate: &str) -> Result<bool> {
            if !self.used.swap(true, Ordering::SeqCst) {
                return Ok(false);
            }
            self.store.exists(candidate).await
        }
    }

    #[tokio::test]
    async fn test_basic_scenario() {
        let (store, _dir) = create_temp_shortener().await;

        let k1 = store.shorten(URL_A).await.unwrap();
        assert_eq!(k1, "2dce0a");
        assert_eq!(store.shorten(URL_A).await.unwrap(), k1);

        let resolved = store.resolve(&k1).await.unwrap();
        assert_eq!(
            resolved,
            Resolved {
                long_url: URL_A.to_owned(),
                visit_count: 1,
            }
        );

        let stats = store.stats(&k1).await.unwrap();
        assert_eq!(stats.long_url, URL_A);
        assert_eq!(stats.visit_count, 1);
        assert!(stats.created_at <= Utc::now().naive_utc() + chrono::Duration::seconds(1));

        assert!(matches!(
            store.resolve("bogus").await,
            Err(ShortenError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_shorten_is_idempotent() {
        let (store, _dir) = create_temp_shortener().await;
        let url = "https://github.com/sudilate/URL_shortner";

        let first = store.shorten(url).await.unwrap();
        store.resolve(&first).await.unwrap();
        let second = store.shorten(url).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(db::count_mappings_for_url(store.pool(), url).await.unwrap(), 1);
        // Re-shortening never resets the counter.
        assert_eq!(store.stats(&first).await.unwrap().visit_count, 1);
    }

    #[tokio::test]
    async fn test_distinct_urls_get_distinct_keys() {
        let (store, _dir) = create_temp_shortener().await;

        let a = store.shorten("https://example.com/a").await.unwrap();
        let b = store.shorten("https://example.com/b").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(b, "d7fe56");
    }

    #[tokio::test]
    async fn test_new_mapping_starts_unvisited() {
        let (store, _dir) = create_temp_shortener().await;
        let key = store.shorten(URL_A).await.unwrap();

        assert_eq!(store.stats(&key).await.unwrap().visit_count, 0);
        assert_eq!(store.stats(&key).await.unwrap().visit_count, 0);
    }

    #[tokio::test]
    async fn test_sequential_resolves_count_up() {
        let (store, _dir) = create_temp_shortener().await;
        let key = store.shorten(URL_A).await.unwrap();
        let created_at = store.stats(&key).await.unwrap().created_at;

        for expected in 1..=5 {
            assert_eq!(store.resolve(&key).await.unwrap().visit_count, expected);
        }

        let stats = store.stats(&key).await.unwrap();
        assert_eq!(stats.visit_count, 5);
        assert_eq!(stats.created_at, created_at);
    }

    #[tokio::test]
    async fn test_stats_sees_every_resolve() {
        let (store, _dir) = create_temp_shortener().await;
        let key = store.shorten(URL_A).await.unwrap();

        for _ in 0..200 {
            let resolved = store.resolve(&key).await.unwrap();
            let stats = store.stats(&key).await.unwrap();
            assert_eq!(stats.visit_count, resolved.visit_count);
        }
    }

    #[tokio::test]
    async fn test_resolve_is_committed_for_other_pools() {
        let (store, dir) = create_temp_shortener().await;
        let key = store.shorten(URL_A).await.unwrap();

        let options = SqliteConnectOptions::new().filename(dir.path().join("test.db"));
        let reader = Shortener::new(
            db::connect_with(options, 1)
                .await
                .expect("Failed to open second pool"),
        );

        for expected in 1..=20 {
            assert_eq!(store.resolve(&key).await.unwrap().visit_count, expected);
            assert_eq!(reader.stats(&key).await.unwrap().visit_count, expected);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolves_lose_no_updates() {
        let (store, _dir) = create_temp_shortener().await;
        let key = store.shorten(URL_A).await.unwrap();
        const VISITS: i64 = 20;

        let handles: Vec<_> = (0..VISITS)
            .map(|_| {
                let store = store.clone();
                let key = key.clone();
                tokio::spawn(async move { store.resolve(&key).await.unwrap().visit_count })
            })
            .collect();

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }
        seen.sort_unstable();

        assert_eq!(seen, (1..=VISITS).collect::<Vec<_>>());
        assert_eq!(store.stats(&key).await.unwrap().visit_count, VISITS);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_shorten_creates_one_mapping() {
        let (store, _dir) = create_temp_shortener().await;

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.shorten(URL_A).await.unwrap() })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "2dce0a");
        }
        assert_eq!(db::count_mappings_for_url(store.pool(), URL_A).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_not_found_mutates_nothing() {
        let (store, _dir) = create_temp_shortener().await;
        let key = store.shorten(URL_A).await.unwrap();

        assert!(matches!(
            store.resolve("nonexistent").await,
            Err(ShortenError::NotFound(k)) if k == "nonexistent"
        ));
        assert!(matches!(
            store.stats("nonexistent").await,
            Err(ShortenError::NotFound(_))
        ));
        assert_eq!(store.stats(&key).await.unwrap().visit_count, 0);
    }

    #[tokio::test]
    async fn test_rejects_invalid_urls() {
        let (store, _dir) = create_temp_shortener().await;

        for bad in ["", "   ", "not_a_url", "mailto:someone@example.com", "https://"] {
            assert!(
                matches!(store.shorten(bad).await, Err(ShortenError::InvalidInput(_))),
                "expected InvalidInput for {bad:?}"
            );
            assert_eq!(db::count_mappings_for_url(store.pool(), bad).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_prefix_collision_lengthens_key() {
        let (store, _dir) = create_temp_shortener().await;
        db::insert_mapping(store.pool(), "2dce0a", "https://other.example/x")
            .await
            .unwrap();

        assert_eq!(store.shorten(URL_A).await.unwrap(), "2dce0a4");
        assert_eq!(store.resolve("2dce0a4").await.unwrap().long_url, URL_A);
        assert_eq!(
            store.resolve("2dce0a").await.unwrap().long_url,
            "https://other.example/x"
        );
    }

    #[tokio::test]
    async fn test_insert_reports_duplicate_key() {
        let (store, _dir) = create_temp_shortener().await;
        db::insert_mapping(store.pool(), "2dce0a", "https://other.example/x")
            .await
            .unwrap();

        let err = db::insert_mapping(store.pool(), "2dce0a", URL_A)
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenError::DuplicateKey(k) if k == "2dce0a"));
        assert_eq!(db::count_mappings_for_url(store.pool(), URL_A).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_keeps_first_mapping_for_url() {
        let (store, _dir) = create_temp_shortener().await;

        let first = db::insert_mapping(store.pool(), "aaaaaa", URL_A).await.unwrap();
        let second = db::insert_mapping(store.pool(), "bbbbbb", URL_A).await.unwrap();

        assert_eq!(first, InsertOutcome::Created("aaaaaa".into()));
        assert_eq!(second, InsertOutcome::Existing("aaaaaa".into()));
        assert!(!db::key_exists(store.pool(), "bbbbbb").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_key_on_insert_triggers_regeneration() {
        let (store, _dir) = create_temp_shortener().await;
        db::insert_mapping(store.pool(), "2dce0a", "https://other.example/x")
            .await
            .unwrap();

        let lookup = StaleOnce {
            store: &store,
            used: AtomicBool::new(false),
        };

        assert_eq!(store.shorten_with(URL_A, &lookup).await.unwrap(), "2dce0a4");
    }

    #[tokio::test]
    async fn test_repeated_duplicate_keys_exhaust_retries() {
        let (store, _dir) = create_temp_shortener().await;
        db::insert_mapping(store.pool(), "2dce0a", "https://other.example/x")
            .await
            .unwrap();

        let err = store.shorten_with(URL_A, &AlwaysFree).await.unwrap_err();

        assert!(matches!(
            err,
            ShortenError::KeyGenerationExhausted {
                attempts: MAX_INSERT_ATTEMPTS
            }
        ));
        assert_eq!(db::count_mappings_for_url(store.pool(), URL_A).await.unwrap(), 0);
    }
}
