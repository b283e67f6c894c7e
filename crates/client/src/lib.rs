//! Transfer client for the remote content API.
//!
//! [`TransferClient`] is the seam the upload logic talks through: one
//! `post` per endpoint call, raw bytes in and out. [`HttpClient`] is the
//! production implementation on top of `reqwest` with Bearer token
//! authentication; tests substitute in-memory mocks.

pub mod client;
pub mod error;
pub mod transport;

pub use client::HttpClient;
pub use error::{ClientError, RemoteError};
pub use transport::{ClientFuture, TransferClient};
