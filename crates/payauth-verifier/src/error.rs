//! Error types for manifest verification.

use std::time::Duration;

/// Verification errors.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Manifest could not be retrieved.
    #[error("transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    /// Manifest URL answered 404.
    #[error("manifest not found: {url}")]
    NotFound { url: String },

    /// Manifest URL answered with a non-retryable status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// A redirect left the allowed URL policy or looped.
    #[error("redirect rejected for {url}: {message}")]
    Redirect { url: String, message: String },

    /// Rate limit exceeded.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Manifest content was rejected by the parser.
    #[error("malformed manifest: {message}")]
    MalformedManifest { message: String },

    /// `start` was called on a session that already ran.
    #[error("verification session {session} already started")]
    AlreadyStarted { session: String },

    /// Cache error.
    #[error("cache error: {message}")]
    Cache { message: String },

    /// Configuration or inventory error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl VerifyError {
    pub(crate) fn transport(url: impl ToString, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedManifest {
            message: message.into(),
        }
    }

    /// Whether the downloader may retry the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transport { .. })
    }
}

impl From<reqwest::Error> for VerifyError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Self::Transport {
            url,
            message: err.to_string(),
        }
    }
}

/// Result type for verification operations.
pub type VerifyResult<T> = Result<T, VerifyError>;
