//! Client error types and retry classification.

use std::fmt;
use std::time::Duration;

/// Summary prefixes the remote uses for transient conditions that come
/// back with a non-5xx status.
const RETRYABLE_SUMMARIES: &[&str] = &["too_many_write_operations", "internal_error"];

/// A non-2xx answer from the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// HTTP status code.
    pub status: u16,
    /// Machine-readable summary (`error_summary`, or the plain-text body).
    pub summary: String,
    /// Offset the remote expected, for `incorrect_offset` rejections.
    pub correct_offset: Option<u64>,
    /// `Retry-After` hint, when the remote sent one.
    pub retry_after: Option<Duration>,
}

impl RemoteError {
    pub fn new(status: u16, summary: impl Into<String>) -> Self {
        Self {
            status,
            summary: summary.into(),
            correct_offset: None,
            retry_after: None,
        }
    }

    /// Rate limits, 5xx and a few transient summaries are worth retrying.
    /// Bad paths, conflicts and auth failures are not.
    pub fn is_retryable(&self) -> bool {
        self.status == 429
            || (500..600).contains(&self.status)
            || RETRYABLE_SUMMARIES
                .iter()
                .any(|prefix| self.summary.starts_with(prefix))
    }

    /// True for `incorrect_offset` rejections.
    pub fn is_incorrect_offset(&self) -> bool {
        self.correct_offset.is_some() || self.summary.contains("incorrect_offset")
    }

    /// True when the session was already closed by an earlier append.
    pub fn is_session_closed(&self) -> bool {
        self.summary.starts_with("closed")
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote error {}: {}", self.status, self.summary)
    }
}

impl std::error::Error for RemoteError {}

/// Errors from the transfer client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid access token")]
    InvalidToken,

    #[error("request arguments are not a valid header value")]
    InvalidArgHeader,
}

impl ClientError {
    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            ClientError::Remote(remote) => remote.is_retryable(),
            ClientError::Json(_) | ClientError::InvalidToken | ClientError::InvalidArgHeader => {
                false
            }
        }
    }

    /// The remote rejection, if this error is one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            ClientError::Remote(remote) => Some(remote),
            _ => None,
        }
    }

    /// Minimum wait the remote asked for before retrying.
    pub fn retry_after(&self) -> Option<Duration> {
        self.remote().and_then(|r| r.retry_after)
    }
}
