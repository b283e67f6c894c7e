//! Wire types for the remote upload API.
//!
//! Covers the four content endpoints the uploader talks to: single-shot
//! upload plus the start/append/finish session trio. Everything here is
//! plain data with serde derives; transport lives in `dbxup-client`.

pub mod constants;
pub mod messages;
pub mod types;

pub use constants::Endpoint;
pub use messages::{
    AppendSessionArg, ApiErrorBody, FinishSessionArg, StartSessionArg, StartSessionResult,
};
pub use types::{CommitInfo, FileMetadata, UploadSessionCursor, WriteMode};
