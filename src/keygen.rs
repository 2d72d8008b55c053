use crate::error::{Result, ShortenError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Length of the first candidate key, in hex characters.
pub const BASE_KEY_LEN: usize = 6;

/// Number of candidates tried before giving up (prefix lengths 6, 7, 8).
pub const MAX_KEY_ATTEMPTS: usize = 3;

/// Existence check the generator runs against the mapping store.
///
/// The answer is advisory: the `short_key` primary key in the database is the
/// authoritative uniqueness check.
#[async_trait]
pub trait KeyLookup: Send + Sync {
    async fn exists(&self, candidate: &str) -> Result<bool>;
}

/// Lower-case hex SHA-256 of the exact URL string.
pub fn fingerprint(long_url: &str) -> String {
    hex::encode(Sha256::digest(long_url.as_bytes()))
}

/// The fixed candidate sequence for a URL: digest prefixes of length
/// `BASE_KEY_LEN + attempt` for each attempt.
pub fn candidates(long_url: &str) -> impl Iterator<Item = String> {
    let digest = fingerprint(long_url);
    (0..MAX_KEY_ATTEMPTS).map(move |attempt| digest[..BASE_KEY_LEN + attempt].to_owned())
}

/// Return the first candidate key for `long_url` that `lookup` reports as
/// unused.
pub async fn generate_key<L>(long_url: &str, lookup: &L) -> Result<String>
where
    L: KeyLookup + ?Sized,
{
    for (attempt, candidate) in candidates(long_url).enumerate() {
        if !lookup.exists(&candidate).await? {
            return Ok(candidate);
        }

        tracing::warn!(
            "Short key '{}' already taken (attempt {}/{})",
            candidate,
            attempt + 1,
            MAX_KEY_ATTEMPTS
        );
    }

    Err(ShortenError::KeyGenerationExhausted {
        attempts: MAX_KEY_ATTEMPTS,
    })
}
