//! Error types for the news cache.
//!
//! Every failure the origin and client tiers can produce is one variant of
//! [`NewsError`]. Whether a variant is "soft" (degrade to cached or padded
//! content) or "hard" (reach the caller) is decided by the component that
//! catches it, not by the error itself.

use thiserror::Error;

/// Errors produced by the origin cache, the paginated API and the client cache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NewsError {
    /// The upstream provider answered 429 or reported a rate limit.
    #[error("upstream rate limited: {0}")]
    UpstreamRateLimited(String),

    /// The upstream provider failed for any other reason.
    ///
    /// `status` is the HTTP status code, or 0 when the request never
    /// produced a response (connect error, body decode error).
    #[error("upstream unavailable ({status}): {message}")]
    UpstreamUnavailable { status: u16, message: String },

    /// A page number outside `1..=MAX_PAGES` was requested.
    #[error("page number must be between 1 and {max}, got {0}", max = crate::news::MAX_PAGES)]
    InvalidPageNumber(u32),

    /// A news domain name that is not `global` or `domestic`.
    #[error("unknown news domain: {0}")]
    UnknownDomain(String),

    /// Durable client storage could not be read or written.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The client could not reach the paginated API or got an error back.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl NewsError {
    /// Classify a non-2xx upstream response.
    ///
    /// HTTP 429, or a message mentioning "rate limit" in any case, is a rate
    /// limit; everything else is plain unavailability.
    pub fn from_upstream(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || message.to_lowercase().contains("rate limit") {
            NewsError::UpstreamRateLimited(message)
        } else {
            NewsError::UpstreamUnavailable { status, message }
        }
    }

    /// Returns `true` for [`NewsError::UpstreamRateLimited`].
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, NewsError::UpstreamRateLimited(_))
    }
}

impl From<reqwest::Error> for NewsError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => NewsError::from_upstream(status.as_u16(), err.to_string()),
            None => NewsError::UpstreamUnavailable {
                status: 0,
                message: err.to_string(),
            },
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NewsError>;
