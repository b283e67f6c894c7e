use std::fmt;

use serde::{Deserialize, Serialize};

/// Base URL of the content host (all upload endpoints live here).
pub const CONTENT_BASE_URL: &str = "https://content.dropboxapi.com/2";

/// Header carrying the JSON-encoded endpoint arguments.
pub const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// Largest request body the remote accepts (150 MiB).
///
/// Bounds both the direct-upload path and each appended chunk.
pub const MAX_REQUEST_BODY: u64 = 150 * 1024 * 1024;

/// Default chunk size for session uploads (50 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 50 * 1024 * 1024;

/// Files up to this size go through a single `/files/upload` call (150 MiB).
pub const DEFAULT_DIRECT_UPLOAD_THRESHOLD: u64 = 150 * 1024 * 1024;

/// Block size used by the remote content hash (4 MiB).
pub const CONTENT_HASH_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Content endpoints used by the uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    #[serde(rename = "/files/upload")]
    Upload,
    #[serde(rename = "/files/upload_session/start")]
    SessionStart,
    #[serde(rename = "/files/upload_session/append_v2")]
    SessionAppend,
    #[serde(rename = "/files/upload_session/finish")]
    SessionFinish,
}

impl Endpoint {
    /// Path relative to [`CONTENT_BASE_URL`].
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Upload => "/files/upload",
            Endpoint::SessionStart => "/files/upload_session/start",
            Endpoint::SessionAppend => "/files/upload_session/append_v2",
            Endpoint::SessionFinish => "/files/upload_session/finish",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
