use serde::{Deserialize, Serialize};

use crate::types::{CommitInfo, UploadSessionCursor};

// ---------------------------------------------------------------------------
// Session arguments
// ---------------------------------------------------------------------------

/// Arguments for `/files/upload_session/start`.
///
/// The uploader always opens sessions with `close = false`; the last
/// append closes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSessionArg {
    pub close: bool,
}

/// Response of `/files/upload_session/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSessionResult {
    pub session_id: String,
}

/// Arguments for `/files/upload_session/append_v2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendSessionArg {
    pub cursor: UploadSessionCursor,
    pub close: bool,
}

/// Arguments for `/files/upload_session/finish`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishSessionArg {
    pub cursor: UploadSessionCursor,
    pub commit: CommitInfo,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// JSON body of a non-2xx response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error_summary: String,
    #[serde(default)]
    pub error: serde_json::Value,
}

impl ApiErrorBody {
    /// Offset the remote expected, when it rejected an append or finish
    /// with `incorrect_offset`.
    ///
    /// Append errors carry it at the top of `error`; finish errors nest it
    /// under `lookup_failed`.
    pub fn correct_offset(&self) -> Option<u64> {
        if let Some(offset) = self.error.get("correct_offset").and_then(|v| v.as_u64()) {
            return Some(offset);
        }
        self.error
            .as_object()?
            .values()
            .find_map(|nested| nested.get("correct_offset").and_then(|v| v.as_u64()))
    }
}
