//! Chunked file transfer primitives.
//!
//! - [`plan_chunks`] splits a file size into contiguous, non-overlapping
//!   byte ranges.
//! - [`ChunkSource`] re-reads any range by position, so a failed append can
//!   resend identical bytes.
//! - [`ContentHasher`] computes the remote's block-based content hash while
//!   the chunks stream past.

mod chunked;
mod hash;
mod types;
mod validation;

pub use chunked::{ChunkPlan, ChunkSource, chunk_count, plan_chunks};
pub use hash::{ContentHasher, content_hash_bytes};
pub use types::Chunk;
pub use validation::{resolve_destination, validate_destination_path};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    #[error("chunk of {0} bytes does not fit in memory on this platform")]
    ChunkTooLarge(u64),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
