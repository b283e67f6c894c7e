//! Upload orchestrator.
//!
//! Picks a strategy per file, drives the session state machine, retries
//! failed appends and releases sessions that cannot be completed.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use dbxup_client::TransferClient;
use dbxup_protocol::{Endpoint, FileMetadata};
use dbxup_transfer::{
    Chunk, ChunkPlan, ChunkSource, ContentHasher, TransferError, content_hash_bytes, plan_chunks,
    validate_destination_path,
};
use futures_util::{StreamExt, stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::UploadConfig;
use crate::error::{AppendFailure, UploadError};
use crate::session::SessionTransport;
use crate::types::{
    UploadEvent, UploadOutcome, UploadReport, UploadSession, UploadState, UploadStrategy,
    UploadTarget,
};

const EVENT_CAPACITY: usize = 256;

/// Picks how a file of `file_size` bytes is sent.
pub fn choose_strategy(file_size: u64, config: &UploadConfig) -> UploadStrategy {
    if file_size <= config.direct_upload_threshold {
        UploadStrategy::Direct
    } else {
        UploadStrategy::Chunked
    }
}

/// Uploads local files through a [`TransferClient`].
pub struct UploadOrchestrator {
    client: Arc<dyn TransferClient>,
    config: UploadConfig,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl UploadOrchestrator {
    /// Creates an orchestrator after validating `config`.
    pub fn new(client: Arc<dyn TransferClient>, config: UploadConfig) -> Result<Self, UploadError> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        Ok(Self {
            client,
            config,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        })
    }

    /// Uses an externally owned cancellation token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Events are best-effort: when the receiver falls behind, new events
    /// are dropped rather than stalling the upload.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns the token that aborts uploads run by this orchestrator.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Uploads one file.
    pub async fn upload(&self, target: &UploadTarget) -> Result<UploadOutcome, UploadError> {
        let result = FileUpload::new(self, target).run().await;

        match &result {
            Ok(outcome) => {
                emit(
                    &self.events_tx,
                    UploadEvent::Completed {
                        destination: target.destination.clone(),
                        metadata: outcome.metadata.clone(),
                    },
                );
                info!(
                    source = %target.source.display(),
                    destination = %outcome.metadata.path_display,
                    strategy = %outcome.strategy,
                    bytes = outcome.bytes,
                    "upload completed"
                );
            }
            Err(e) => {
                emit(
                    &self.events_tx,
                    UploadEvent::Failed {
                        destination: target.destination.clone(),
                        error: e.to_string(),
                    },
                );
                error!(
                    source = %target.source.display(),
                    destination = %target.destination,
                    error = %e,
                    "upload failed"
                );
            }
        }

        result
    }

    /// Uploads several files with at most `jobs` in flight.
    ///
    /// Each file runs independently; one failure does not stop the others.
    /// Reports come back in input order. Two targets sharing a destination
    /// are rejected after the first.
    pub async fn upload_batch(&self, targets: Vec<UploadTarget>, jobs: usize) -> Vec<UploadReport> {
        let jobs = jobs.max(1);
        info!(files = targets.len(), jobs, "starting batch upload");

        let mut seen = HashSet::new();
        let targets: Vec<(UploadTarget, bool)> = targets
            .into_iter()
            .map(|t| {
                let unique = seen.insert(t.destination.to_lowercase());
                (t, unique)
            })
            .collect();

        stream::iter(targets)
            .map(|(target, unique)| async move {
                let result = if unique {
                    self.upload(&target).await
                } else {
                    Err(UploadError::InvalidTarget(TransferError::InvalidPath(
                        format!("duplicate destination in batch: {}", target.destination),
                    )))
                };
                UploadReport {
                    source: target.source,
                    destination: target.destination,
                    result,
                }
            })
            .buffered(jobs)
            .collect()
            .await
    }
}

fn emit(tx: &mpsc::Sender<UploadEvent>, event: UploadEvent) {
    if let Err(e) = tx.try_send(event) {
        trace!(error = %e, "upload event dropped");
    }
}

/// Why the append loop stopped early.
enum AppendAbort {
    Cancelled,
    Failed { failure: AppendFailure, attempts: u32 },
}

/// State machine for a single file.
struct FileUpload<'a> {
    client: &'a dyn TransferClient,
    config: &'a UploadConfig,
    target: &'a UploadTarget,
    events_tx: &'a mpsc::Sender<UploadEvent>,
    cancel: &'a CancellationToken,
    state: UploadState,
}

impl<'a> FileUpload<'a> {
    fn new(orch: &'a UploadOrchestrator, target: &'a UploadTarget) -> Self {
        Self {
            client: &*orch.client,
            config: &orch.config,
            target,
            events_tx: &orch.events_tx,
            cancel: &orch.cancel,
            state: UploadState::Idle,
        }
    }

    async fn run(mut self) -> Result<UploadOutcome, UploadError> {
        let result = self.drive().await;
        self.set_state(if result.is_ok() {
            UploadState::Completed
        } else {
            UploadState::Failed
        });
        result
    }

    async fn drive(&mut self) -> Result<UploadOutcome, UploadError> {
        self.set_state(UploadState::Planning);
        validate_destination_path(&self.target.destination).map_err(UploadError::InvalidTarget)?;
        self.check_cancelled()?;

        let source = ChunkSource::open_async(&self.target.source)
            .await
            .map_err(|e| self.source_error(e))?;
        let file_size = source.size();
        let strategy = choose_strategy(file_size, self.config);

        debug!(
            source = %self.target.source.display(),
            destination = %self.target.destination,
            file_size,
            %strategy,
            "upload planned"
        );

        match strategy {
            UploadStrategy::Direct => self.upload_direct(&source).await,
            UploadStrategy::Chunked => {
                let plan = plan_chunks(file_size, self.config.chunk_size);
                self.upload_chunked(&source, plan).await
            }
        }
    }

    async fn upload_direct(&mut self, source: &ChunkSource) -> Result<UploadOutcome, UploadError> {
        self.set_state(UploadState::DirectUpload);

        let data = Bytes::from(source.read_all().await.map_err(|e| self.source_error(e))?);
        let expected_hash = self
            .config
            .verify_content_hash
            .then(|| content_hash_bytes(&data));
        self.check_cancelled()?;

        let args = serde_json::to_value(self.target.commit_info())
            .map_err(|e| UploadError::DirectUpload(e.into()))?;
        let body = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(UploadError::Cancelled {
                    session_closed: None,
                });
            }
            result = self.client.post(Endpoint::Upload, &args, Some(data)) => {
                result.map_err(UploadError::DirectUpload)?
            }
        };
        let metadata: FileMetadata =
            serde_json::from_slice(&body).map_err(|e| UploadError::DirectUpload(e.into()))?;

        verify_content_hash(expected_hash, &metadata)?;

        Ok(UploadOutcome {
            metadata,
            strategy: UploadStrategy::Direct,
            bytes: source.size(),
            chunks: 0,
            session_id: None,
        })
    }

    async fn upload_chunked(
        &mut self,
        source: &ChunkSource,
        plan: ChunkPlan,
    ) -> Result<UploadOutcome, UploadError> {
        self.set_state(UploadState::SessionStarting);
        self.check_cancelled()?;

        let transport = SessionTransport::new(self.client);
        let mut session = transport.start().await?;
        self.set_state(UploadState::Appending);

        let file_size = plan.file_size();
        let total = plan.len();
        let mut hasher = self.config.verify_content_hash.then(ContentHasher::new);

        for (index, chunk) in plan.enumerate() {
            let is_final = index + 1 == total;
            match self
                .append_with_retry(&transport, &mut session, source, index, &chunk, is_final)
                .await
            {
                Ok(data) => {
                    if let Some(hasher) = hasher.as_mut() {
                        hasher.update(&data);
                    }
                    self.emit(UploadEvent::ChunkAppended {
                        destination: self.target.destination.clone(),
                        index,
                        total,
                        bytes_sent: session.cursor(),
                        file_size,
                    });
                }
                Err(abort) => {
                    let session_closed = self.release(&transport, &mut session).await;
                    return Err(match abort {
                        AppendAbort::Cancelled => UploadError::Cancelled {
                            session_closed: Some(session_closed),
                        },
                        AppendAbort::Failed { failure, attempts } => UploadError::ChunkAppend {
                            chunk_index: index,
                            offset: chunk.offset,
                            attempts,
                            session_closed,
                            source: failure,
                        },
                    });
                }
            }
        }

        // Once every chunk is confirmed the finish always runs; it is the
        // cheapest way to release the session.
        self.set_state(UploadState::Finishing);
        let metadata = transport
            .finish(&mut session, &self.target.commit_info())
            .await?;

        verify_content_hash(hasher.map(ContentHasher::finalize), &metadata)?;

        Ok(UploadOutcome {
            metadata,
            strategy: UploadStrategy::Chunked,
            bytes: file_size,
            chunks: total,
            session_id: Some(session.id().to_string()),
        })
    }

    async fn append_with_retry(
        &self,
        transport: &SessionTransport<'_>,
        session: &mut UploadSession,
        source: &ChunkSource,
        index: usize,
        chunk: &Chunk,
        is_final: bool,
    ) -> Result<Bytes, AppendAbort> {
        let policy = &self.config.retry;
        let mut attempt = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(AppendAbort::Cancelled);
            }
            attempt += 1;

            // A stalled request must not outlive cancellation.
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(AppendAbort::Cancelled),
                result = transport.append(session, chunk, source, is_final) => result,
            };

            match result {
                Ok(data) => return Ok(data),
                Err(failure) if failure.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.delay_with_hint(attempt, failure.retry_after());
                    warn!(
                        destination = %self.target.destination,
                        chunk = index,
                        offset = chunk.offset,
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "chunk append failed, retrying"
                    );
                    self.emit(UploadEvent::RetryScheduled {
                        destination: self.target.destination.clone(),
                        chunk_index: index,
                        attempt,
                        delay,
                        error: failure.to_string(),
                    });

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(AppendAbort::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(failure) => {
                    return Err(AppendAbort::Failed {
                        failure,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    /// Best-effort finish of a session that cannot complete normally.
    ///
    /// Commits whatever the remote confirmed under a non-overwriting mode,
    /// bounded by the cleanup timeout. Returns whether the session was
    /// released. Failures are logged, never returned.
    async fn release(&self, transport: &SessionTransport<'_>, session: &mut UploadSession) -> bool {
        if session.is_finished() {
            return true;
        }

        warn!(
            session_id = %session.id(),
            offset = session.cursor(),
            "releasing upload session"
        );
        let commit = self.target.release_commit_info();
        match tokio::time::timeout(
            self.config.cleanup_timeout,
            transport.finish(session, &commit),
        )
        .await
        {
            Ok(Ok(metadata)) => {
                warn!(
                    path = %metadata.path_display,
                    bytes = metadata.size,
                    "partial upload committed while releasing session"
                );
                true
            }
            Ok(Err(e)) => {
                error!(error = %e, "failed to release upload session; it will expire on the remote");
                false
            }
            Err(_) => {
                error!(
                    timeout_secs = self.config.cleanup_timeout.as_secs(),
                    "releasing upload session timed out; it will expire on the remote"
                );
                false
            }
        }
    }

    fn set_state(&mut self, next: UploadState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal upload state transition {:?} -> {next:?}",
            self.state
        );
        trace!(
            destination = %self.target.destination,
            from = ?self.state,
            to = ?next,
            "upload state changed"
        );
        self.state = next;
        self.emit(UploadEvent::StateChanged {
            destination: self.target.destination.clone(),
            state: next,
        });
    }

    fn emit(&self, event: UploadEvent) {
        emit(self.events_tx, event);
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled {
                session_closed: None,
            });
        }
        Ok(())
    }

    fn source_error(&self, source: TransferError) -> UploadError {
        UploadError::SourceRead {
            path: self.target.source.clone(),
            source,
        }
    }
}

/// Compares the local hash with the one the remote reports. A remote that
/// reports none is trusted.
fn verify_content_hash(expected: Option<String>, metadata: &FileMetadata) -> Result<(), UploadError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match &metadata.content_hash {
        Some(actual) if actual.eq_ignore_ascii_case(&expected) => Ok(()),
        Some(actual) => Err(UploadError::ContentHashMismatch {
            expected,
            actual: actual.clone(),
        }),
        None => {
            debug!(path = %metadata.path_display, "remote reported no content hash");
            Ok(())
        }
    }
}
