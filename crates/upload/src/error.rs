//! Upload error types.

use std::path::PathBuf;
use std::time::Duration;

use dbxup_client::ClientError;
use dbxup_transfer::TransferError;

/// Why a single append attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum AppendFailure {
    #[error("reading chunk failed: {0}")]
    Read(#[from] TransferError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("chunk offset {offset} does not match session cursor {cursor}")]
    CursorMismatch { cursor: u64, offset: u64 },

    #[error("session no longer accepts appends")]
    SessionClosed,
}

impl AppendFailure {
    /// Only network and transient remote failures are worth repeating.
    /// Local read errors and ordering violations are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppendFailure::Client(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Minimum wait the remote asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AppendFailure::Client(e) => e.retry_after(),
            _ => None,
        }
    }
}

/// Errors produced by an upload.
///
/// Variants raised after a session was started say whether the session
/// was released afterwards.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("cannot read source file {}: {source}", .path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: TransferError,
    },

    #[error("invalid destination: {0}")]
    InvalidTarget(#[source] TransferError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to start upload session: {0}")]
    SessionStart(#[source] ClientError),

    #[error(
        "append of chunk {chunk_index} at offset {offset} failed after {attempts} attempt(s): {source}; {}",
        released_note(.session_closed)
    )]
    ChunkAppend {
        chunk_index: usize,
        offset: u64,
        attempts: u32,
        session_closed: bool,
        #[source]
        source: AppendFailure,
    },

    #[error(
        "failed to finish upload session {session_id} at offset {offset}: {source}; upload session may remain open until it expires"
    )]
    SessionFinish {
        session_id: String,
        offset: u64,
        #[source]
        source: ClientError,
    },

    #[error("direct upload failed: {0}")]
    DirectUpload(#[source] ClientError),

    #[error("upload session {session_id} was already finished")]
    SessionAlreadyFinished { session_id: String },

    #[error("content hash mismatch: local {expected}, remote {actual}")]
    ContentHashMismatch { expected: String, actual: String },

    #[error("upload cancelled; {}", cancelled_note(.session_closed))]
    Cancelled { session_closed: Option<bool> },
}

impl UploadError {
    /// True when a remote session may have been left open.
    ///
    /// The remote expires abandoned sessions on its own, so this is purely
    /// informational.
    pub fn session_may_be_open(&self) -> bool {
        match self {
            UploadError::ChunkAppend { session_closed, .. } => !session_closed,
            UploadError::Cancelled { session_closed } => *session_closed == Some(false),
            UploadError::SessionFinish { .. } => true,
            _ => false,
        }
    }

    /// True for user-requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled { .. })
    }
}

fn released_note(session_closed: &bool) -> &'static str {
    session_note(Some(*session_closed))
}

fn cancelled_note(session_closed: &Option<bool>) -> &'static str {
    session_note(*session_closed)
}

fn session_note(session_closed: Option<bool>) -> &'static str {
    match session_closed {
        None => "no session was open",
        Some(true) => "upload session was released",
        Some(false) => "upload session may remain open until it expires",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbxup_client::RemoteError;

    #[test]
    fn append_failure_retry_classification() {
        let transient = AppendFailure::Client(RemoteError::new(503, "").into());
        assert!(transient.is_retryable());

        let conflict = AppendFailure::Client(RemoteError::new(409, "path/conflict").into());
        assert!(!conflict.is_retryable());

        let short = AppendFailure::Read(TransferError::ShortRead {
            offset: 0,
            expected: 4,
            actual: 2,
        });
        assert!(!short.is_retryable());
        assert!(!AppendFailure::CursorMismatch { cursor: 0, offset: 4 }.is_retryable());
        assert!(!AppendFailure::SessionClosed.is_retryable());
    }

    #[test]
    fn append_failure_retry_after() {
        let mut remote = RemoteError::new(429, "too_many_requests");
        remote.retry_after = Some(Duration::from_secs(2));
        let failure = AppendFailure::Client(remote.into());
        assert_eq!(failure.retry_after(), Some(Duration::from_secs(2)));
        assert_eq!(AppendFailure::SessionClosed.retry_after(), None);
    }

    #[test]
    fn chunk_append_message_mentions_session_state() {
        let err = UploadError::ChunkAppend {
            chunk_index: 2,
            offset: 100,
            attempts: 3,
            session_closed: false,
            source: AppendFailure::Client(RemoteError::new(503, "unavailable").into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("chunk 2"));
        assert!(msg.contains("3 attempt"));
        assert!(msg.contains("may remain open"));
        assert!(err.session_may_be_open());
    }

    #[test]
    fn cancelled_message() {
        let err = UploadError::Cancelled {
            session_closed: None,
        };
        assert!(err.to_string().contains("cancelled"));
        assert!(err.is_cancelled());
        assert!(!err.session_may_be_open());

        let err = UploadError::Cancelled {
            session_closed: Some(true),
        };
        assert!(err.to_string().contains("released"));
        assert!(!err.session_may_be_open());
    }
}
