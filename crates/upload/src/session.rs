//! Session transport: start, append and finish against a [`TransferClient`].
//!
//! Owns nothing but a borrowed client. All session state lives in the
//! [`UploadSession`] the caller passes in, so ordering rules are checked
//! here and nowhere else.

use bytes::Bytes;
use dbxup_client::{ClientError, TransferClient};
use dbxup_protocol::{
    AppendSessionArg, CommitInfo, Endpoint, FileMetadata, FinishSessionArg, StartSessionArg,
    StartSessionResult,
};
use dbxup_transfer::{Chunk, ChunkSource};
use tracing::{debug, info, warn};

use crate::error::{AppendFailure, UploadError};
use crate::types::UploadSession;

/// Wraps the three session endpoints.
pub struct SessionTransport<'a> {
    client: &'a dyn TransferClient,
}

impl<'a> SessionTransport<'a> {
    pub fn new(client: &'a dyn TransferClient) -> Self {
        Self { client }
    }

    /// Opens a new remote session with the cursor at zero.
    pub async fn start(&self) -> Result<UploadSession, UploadError> {
        let args = serde_json::to_value(StartSessionArg::default())
            .map_err(|e| UploadError::SessionStart(e.into()))?;
        let body = self
            .client
            .post(Endpoint::SessionStart, &args, None)
            .await
            .map_err(UploadError::SessionStart)?;
        let result: StartSessionResult = serde_json::from_slice(&body)
            .map_err(|e| UploadError::SessionStart(e.into()))?;

        info!(session_id = %result.session_id, "upload session started");
        Ok(UploadSession::new(result.session_id))
    }

    /// Sends `chunk` from `source` at the session cursor.
    ///
    /// The chunk must start exactly at the cursor. Bytes are read from the
    /// source on every call, so a retry resends identical data. The cursor
    /// advances only once the remote confirms; `is_final` also closes the
    /// session to further appends. Returns the bytes that were committed.
    ///
    /// An earlier attempt may have landed even though its answer was lost.
    /// Two rejections say so and count as success: `incorrect_offset` with
    /// the expected offset at the end of this chunk, and `closed` when a
    /// closing append for this session already went out.
    pub async fn append(
        &self,
        session: &mut UploadSession,
        chunk: &Chunk,
        source: &ChunkSource,
        is_final: bool,
    ) -> Result<Bytes, AppendFailure> {
        if session.is_closed() {
            return Err(AppendFailure::SessionClosed);
        }
        if chunk.offset != session.cursor() {
            return Err(AppendFailure::CursorMismatch {
                cursor: session.cursor(),
                offset: chunk.offset,
            });
        }

        let data = Bytes::from(source.read_chunk_async(*chunk).await?);
        let args = serde_json::to_value(AppendSessionArg {
            cursor: session.wire_cursor(),
            close: is_final,
        })
        .map_err(ClientError::from)?;
        let resent_close = is_final && session.note_close_sent();

        match self
            .client
            .post(Endpoint::SessionAppend, &args, Some(data.clone()))
            .await
        {
            Ok(_) => {}
            Err(e) if already_applied(&e, chunk, resent_close) => {
                warn!(
                    session_id = %session.id(),
                    offset = chunk.offset,
                    "append already applied by the remote, continuing"
                );
            }
            Err(e) => return Err(e.into()),
        }

        session.advance(chunk.length);
        if is_final {
            session.close();
        }
        debug!(
            session_id = %session.id(),
            cursor = session.cursor(),
            is_final,
            "chunk appended"
        );
        Ok(data)
    }

    /// Commits the session at its current cursor.
    ///
    /// Refuses a session that was already finished. On failure the session
    /// is left unfinished.
    pub async fn finish(
        &self,
        session: &mut UploadSession,
        commit: &CommitInfo,
    ) -> Result<FileMetadata, UploadError> {
        if session.is_finished() {
            return Err(UploadError::SessionAlreadyFinished {
                session_id: session.id().to_string(),
            });
        }

        let offset = session.cursor();
        let finish_err = |source: ClientError| UploadError::SessionFinish {
            session_id: session.id().to_string(),
            offset,
            source,
        };

        let args = serde_json::to_value(FinishSessionArg {
            cursor: session.wire_cursor(),
            commit: commit.clone(),
        })
        .map_err(|e| finish_err(e.into()))?;
        let body = self
            .client
            .post(Endpoint::SessionFinish, &args, None)
            .await
            .map_err(finish_err)?;
        let metadata: FileMetadata =
            serde_json::from_slice(&body).map_err(|e| finish_err(e.into()))?;

        session.mark_finished();
        info!(
            session_id = %session.id(),
            offset,
            path = %metadata.path_display,
            "upload session finished"
        );
        Ok(metadata)
    }
}

fn already_applied(err: &ClientError, chunk: &Chunk, resent_close: bool) -> bool {
    let Some(remote) = err.remote() else {
        return false;
    };
    (remote.is_incorrect_offset() && remote.correct_offset == Some(chunk.end()))
        || (resent_close && remote.is_session_closed())
}
