//! Large-file upload flow against the remote content API.
//!
//! This crate holds the **business logic** of an upload. It does no HTTP
//! itself: callers hand it a [`TransferClient`](dbxup_client::TransferClient),
//! which keeps every path here testable with an in-memory client.
//!
//! # Pipeline
//!
//! 1. **Plan**: validate the destination, open the source, pick a strategy
//! 2. **Direct**: files up to the threshold go out in one request
//! 3. **Start**: larger files open an upload session
//! 4. **Append**: chunks are sent in order, each retried on transient errors
//! 5. **Finish**: the session is committed at the final offset
//!
//! A session that cannot complete is released with a best-effort finish.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{RetryPolicy, UploadConfig};
pub use error::{AppendFailure, UploadError};
pub use orchestrator::{UploadOrchestrator, choose_strategy};
pub use session::SessionTransport;
pub use types::{
    UploadEvent, UploadOutcome, UploadReport, UploadSession, UploadState, UploadStrategy,
    UploadTarget,
};
