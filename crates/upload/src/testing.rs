//! Scripted in-memory [`TransferClient`] shared by the crate's tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use dbxup_client::{ClientError, ClientFuture, RemoteError, TransferClient};
use dbxup_protocol::{Endpoint, FileMetadata};
use dbxup_transfer::ChunkSource;
use tokio_util::sync::CancellationToken;

/// Canned answer for one request.
pub enum Reply {
    Ok(Vec<u8>),
    Err(RemoteError),
    /// Never answers, like a request stuck on a dead connection.
    Hang,
}

impl Reply {
    /// Empty JSON success, as returned by append.
    pub fn ok() -> Self {
        Reply::Ok(b"null".to_vec())
    }

    pub fn remote(status: u16, summary: &str) -> Self {
        Reply::Err(RemoteError::new(status, summary))
    }
}

pub fn start_reply(session_id: &str) -> Reply {
    Reply::Ok(serde_json::to_vec(&serde_json::json!({ "session_id": session_id })).unwrap())
}

pub fn finish_reply(path: &str, size: u64) -> Reply {
    metadata_reply(path, size, None)
}

pub fn metadata_reply(path: &str, size: u64, content_hash: Option<String>) -> Reply {
    let metadata = FileMetadata {
        name: path.rsplit('/').next().unwrap_or_default().to_string(),
        id: "id:test".into(),
        path_display: path.into(),
        path_lower: Some(path.to_lowercase()),
        rev: "015f0000000001".into(),
        size,
        content_hash,
        ..FileMetadata::default()
    };
    Reply::Ok(serde_json::to_vec(&metadata).unwrap())
}

/// A request as seen by the mock.
#[derive(Debug, Clone)]
pub struct Call {
    pub endpoint: Endpoint,
    pub args: serde_json::Value,
    pub body: Option<Bytes>,
}

/// Answers requests from a script, in order, and records them.
pub struct MockClient {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Call>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl MockClient {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            cancel_after: None,
        }
    }

    /// Cancels `token` once `calls` requests have been answered.
    pub fn cancel_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .count()
    }
}

impl TransferClient for MockClient {
    fn post<'a>(
        &'a self,
        endpoint: Endpoint,
        args: &'a serde_json::Value,
        body: Option<Bytes>,
    ) -> ClientFuture<'a> {
        Box::pin(async move {
            let answered = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(Call {
                    endpoint,
                    args: args.clone(),
                    body,
                });
                calls.len()
            };
            let reply = self.replies.lock().unwrap().pop_front();

            if let Some((after, token)) = &self.cancel_after
                && answered >= *after
            {
                token.cancel();
            }

            match reply {
                Some(Reply::Ok(body)) => Ok(body),
                Some(Reply::Err(remote)) => Err(ClientError::Remote(remote)),
                Some(Reply::Hang) => std::future::pending().await,
                None => Err(ClientError::Remote(RemoteError::new(
                    400,
                    "mock/script_exhausted",
                ))),
            }
        })
    }
}

/// Writes `data` to a fresh file under `dir` and returns its path.
pub fn write_source_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// Writes `data` to `src.bin` under `dir` and opens it.
pub fn write_file(dir: &Path, data: &[u8]) -> ChunkSource {
    let path = write_source_file(dir, "src.bin", data);
    ChunkSource::open(&path).unwrap()
}
