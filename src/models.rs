use chrono::NaiveDateTime;
use serde::Serialize;

/// A shortened URL record from the `urls` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UrlMapping {
    pub short_key: String,
    pub long_url: String,
    pub created_at: NaiveDateTime,
    pub visit_count: i64,
}

/// Result of a resolve: the target plus the post-increment visit count.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Resolved {
    pub long_url: String,
    pub visit_count: i64,
}

/// Read-only view served by `GET /stats/:short_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlStats {
    pub long_url: String,
    pub visit_count: i64,
    pub created_at: NaiveDateTime,
}

impl From<UrlMapping> for UrlStats {
    fn from(mapping: UrlMapping) -> Self {
        Self {
            long_url: mapping.long_url,
            visit_count: mapping.visit_count,
            created_at: mapping.created_at,
        }
    }
}
