//! Error types for the digest pipeline

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, DigestError>;

/// Call-level failure categories
///
/// Every failure that reaches a caller is one of these. Parsing errors are
/// normally recovered inside the parser and only show up as issues on a
/// [`ParsedMessage`](crate::gmail::ParsedMessage).
#[derive(Debug, Error)]
pub enum DigestError {
    /// Missing or unusable credential/token path or settings value
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Grant revoked or expired, consent missing, or repeated 401
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Bad caller input or a non-retryable 4xx from the provider
    #[error("validation error: {0}")]
    Validation(String),

    /// HTTP 429 persisted past the retry budget
    #[error("rate limited after {attempts} attempts")]
    RateLimit { attempts: u32 },

    /// Connection failures or 5xx responses persisted past the retry budget
    #[error("network error: {0}")]
    Network(String),

    /// A malformed message or message part
    #[error("parsing error: {0}")]
    Parsing(String),

    /// The caller-supplied deadline passed before the call completed
    #[error("deadline exceeded")]
    Timeout,
}

/// Discriminant of [`DigestError`], handy for logging and assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Authentication,
    Validation,
    RateLimit,
    Network,
    Parsing,
    Timeout,
}

impl DigestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DigestError::Configuration(_) => ErrorKind::Configuration,
            DigestError::Authentication(_) => ErrorKind::Authentication,
            DigestError::Validation(_) => ErrorKind::Validation,
            DigestError::RateLimit { .. } => ErrorKind::RateLimit,
            DigestError::Network(_) => ErrorKind::Network,
            DigestError::Parsing(_) => ErrorKind::Parsing,
            DigestError::Timeout => ErrorKind::Timeout,
        }
    }

    /// Whether the whole operation may succeed if the caller tries again later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DigestError::RateLimit { .. } | DigestError::Network(_) | DigestError::Timeout
        )
    }
}

impl From<anyhow::Error> for DigestError {
    fn from(err: anyhow::Error) -> Self {
        // anyhow only crosses into this crate from the config helpers
        DigestError::Configuration(format!("{:#}", err))
    }
}
