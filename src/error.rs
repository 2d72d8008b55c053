use thiserror::Error;

/// Every way a shorten / resolve / stats call can fail.
///
/// Callers branch on the variant, never on the message text. `DuplicateKey`
/// is transient: the shortener retries it internally and it does not escape
/// [`crate::shortener::Shortener`].
#[derive(Debug, Error)]
pub enum ShortenError {
    /// Empty, unparseable, or non-absolute URL.
    #[error("invalid URL: {0}")]
    InvalidInput(String),

    /// No mapping exists for the short key.
    #[error("short key not found: {0}")]
    NotFound(String),

    /// A concurrent writer claimed the candidate key between the existence
    /// check and the insert.
    #[error("short key already taken: {0}")]
    DuplicateKey(String),

    /// Every bounded attempt collided with an existing key.
    #[error("unable to generate a unique short key after {attempts} attempts")]
    KeyGenerationExhausted { attempts: usize },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T, E = ShortenError> = std::result::Result<T, E>;
