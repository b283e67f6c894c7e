//! Data types for the upload flow.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dbxup_protocol::{CommitInfo, FileMetadata, UploadSessionCursor, WriteMode};
use serde::Serialize;

use crate::error::UploadError;

/// One local file and where it should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub source: PathBuf,
    /// Absolute remote path of the file.
    pub destination: String,
    pub mode: WriteMode,
    pub autorename: bool,
    pub mute: bool,
    pub client_modified: Option<DateTime<Utc>>,
}

impl UploadTarget {
    /// Target with the remote defaults: `add` mode, no autorename, not muted.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            mode: WriteMode::default(),
            autorename: false,
            mute: false,
            client_modified: None,
        }
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_autorename(mut self, autorename: bool) -> Self {
        self.autorename = autorename;
        self
    }

    pub fn with_mute(mut self, mute: bool) -> Self {
        self.mute = mute;
        self
    }

    pub fn with_client_modified(mut self, ts: Option<DateTime<Utc>>) -> Self {
        self.client_modified = ts;
        self
    }

    /// Commit metadata sent with a direct upload or a session finish.
    pub fn commit_info(&self) -> CommitInfo {
        CommitInfo {
            path: self.destination.clone(),
            mode: self.mode.clone(),
            autorename: self.autorename,
            mute: self.mute,
            client_modified: self.client_modified,
        }
    }

    /// Commit used when releasing a session after a failure.
    ///
    /// Never replaces an existing file: the partial content lands next to
    /// it under a renamed path.
    pub(crate) fn release_commit_info(&self) -> CommitInfo {
        CommitInfo {
            mode: WriteMode::Add,
            autorename: true,
            ..self.commit_info()
        }
    }
}

/// Client-side view of an open remote upload session.
///
/// Owned exclusively by the upload that started it. The cursor only moves
/// forward, and only after the remote confirmed an append.
#[derive(Debug, PartialEq, Eq)]
pub struct UploadSession {
    id: String,
    cursor: u64,
    closed: bool,
    close_sent: bool,
    finished: bool,
}

impl UploadSession {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            cursor: 0,
            closed: false,
            close_sent: false,
            finished: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of bytes the remote has confirmed.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// No further appends are accepted (the final append was sent, or the
    /// session was finished).
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Finish succeeded. A finished session is never finished again.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn wire_cursor(&self) -> UploadSessionCursor {
        UploadSessionCursor {
            session_id: self.id.clone(),
            offset: self.cursor,
        }
    }

    pub(crate) fn advance(&mut self, len: u64) {
        self.cursor += len;
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    /// Records that an append carrying `close` went out, whether or not the
    /// answer came back. Returns whether one had been sent before.
    pub(crate) fn note_close_sent(&mut self) -> bool {
        std::mem::replace(&mut self.close_sent, true)
    }

    pub(crate) fn mark_finished(&mut self) {
        self.closed = true;
        self.finished = true;
    }
}

/// How a file is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    /// One request carrying the whole file.
    Direct,
    /// Start, sequential appends, finish.
    Chunked,
}

impl fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStrategy::Direct => f.write_str("direct"),
            UploadStrategy::Chunked => f.write_str("chunked"),
        }
    }
}

/// Lifecycle of a single file upload.
///
/// `Idle -> Planning -> DirectUpload -> Completed`, or
/// `Idle -> Planning -> SessionStarting -> Appending -> Finishing -> Completed`.
/// Any state may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    Planning,
    DirectUpload,
    SessionStarting,
    Appending,
    Finishing,
    Completed,
    Failed,
}

impl UploadState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: UploadState) -> bool {
        use UploadState::*;
        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Idle, Planning)
            | (Planning, DirectUpload)
            | (Planning, SessionStarting)
            | (DirectUpload, Completed)
            | (SessionStarting, Appending)
            | (Appending, Finishing)
            | (Finishing, Completed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Failed)
    }
}

/// Progress event emitted during an upload.
///
/// Events are keyed by destination path, which is unique within a batch.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// The upload moved to a new lifecycle state.
    StateChanged {
        destination: String,
        state: UploadState,
    },
    /// The remote confirmed a chunk.
    ChunkAppended {
        destination: String,
        index: usize,
        total: usize,
        bytes_sent: u64,
        file_size: u64,
    },
    /// An append failed and will be repeated after `delay`.
    RetryScheduled {
        destination: String,
        chunk_index: usize,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    /// The file was committed.
    Completed {
        destination: String,
        metadata: FileMetadata,
    },
    /// The upload failed.
    Failed { destination: String, error: String },
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub metadata: FileMetadata,
    pub strategy: UploadStrategy,
    /// Bytes sent, equal to the local file size.
    pub bytes: u64,
    /// Number of appends (zero for direct uploads).
    pub chunks: usize,
    pub session_id: Option<String>,
}

/// Per-file result of a batch upload.
#[derive(Debug)]
pub struct UploadReport {
    pub source: PathBuf,
    pub destination: String,
    pub result: Result<UploadOutcome, UploadError>,
}

impl UploadReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_defaults() {
        let t = UploadTarget::new("/tmp/a.bin", "/a.bin");
        assert_eq!(t.mode, WriteMode::Add);
        assert!(!t.autorename);
        assert!(!t.mute);
        assert!(t.client_modified.is_none());
    }

    #[test]
    fn commit_info_carries_target_metadata() {
        let t = UploadTarget::new("/tmp/a.bin", "/backups/a.bin")
            .with_mode(WriteMode::Update("0123abcd".into()))
            .with_autorename(true)
            .with_mute(true);
        let commit = t.commit_info();
        assert_eq!(commit.path, "/backups/a.bin");
        assert_eq!(commit.mode, WriteMode::Update("0123abcd".into()));
        assert!(commit.autorename);
        assert!(commit.mute);
    }

    #[test]
    fn release_commit_never_overwrites() {
        let t = UploadTarget::new("/tmp/a.bin", "/a.bin").with_mode(WriteMode::Overwrite);
        let commit = t.release_commit_info();
        assert_eq!(commit.mode, WriteMode::Add);
        assert!(commit.autorename);
        assert_eq!(commit.path, "/a.bin");
    }

    #[test]
    fn session_flags() {
        let mut s = UploadSession::new("sid".into());
        assert_eq!(s.cursor(), 0);
        s.advance(10);
        assert_eq!(s.wire_cursor().offset, 10);
        assert!(!s.is_closed());
        s.close();
        assert!(s.is_closed());
        assert!(!s.is_finished());
        s.mark_finished();
        assert!(s.is_finished());
    }

    #[test]
    fn state_transitions() {
        use UploadState::*;
        assert!(Idle.can_transition_to(Planning));
        assert!(Planning.can_transition_to(DirectUpload));
        assert!(Planning.can_transition_to(SessionStarting));
        assert!(SessionStarting.can_transition_to(Appending));
        assert!(Appending.can_transition_to(Finishing));
        assert!(Finishing.can_transition_to(Completed));
        assert!(Appending.can_transition_to(Failed));

        assert!(!Idle.can_transition_to(Appending));
        assert!(!DirectUpload.can_transition_to(Appending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Planning));
        assert!(Completed.is_terminal());
    }

    #[test]
    fn strategy_display() {
        assert_eq!(UploadStrategy::Direct.to_string(), "direct");
        assert_eq!(UploadStrategy::Chunked.to_string(), "chunked");
    }
}
