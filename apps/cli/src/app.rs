//! Wires the client, the orchestrator and Ctrl-C handling together.

use std::sync::Arc;

use anyhow::Context;
use dbxup_client::HttpClient;
use dbxup_upload::{UploadEvent, UploadOrchestrator, UploadReport};
use tokio::sync::mpsc;

use crate::cli::Args;
use crate::config::Config;

/// Uploads every source named on the command line.
///
/// Returns the number of files that failed.
pub async fn run(args: Args, config: Config) -> anyhow::Result<usize> {
    let config = config.with_overrides(&args);
    let upload_config = config.upload_config()?;
    let token = config
        .token()
        .context("no access token: pass --token, set DBXUP_TOKEN or add `token` to the config file")?;
    let targets = args.targets()?;

    let client = HttpClient::new(token)?;
    let mut orchestrator = UploadOrchestrator::new(Arc::new(client), upload_config)?;

    let cancel = orchestrator.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("interrupt received, releasing open sessions (press Ctrl-C again to quit now)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("second interrupt, exiting without cleanup");
            std::process::exit(130);
        }
    });

    let event_log = orchestrator.take_events().map(|rx| tokio::spawn(log_events(rx)));

    let reports = orchestrator.upload_batch(targets, config.jobs).await;

    // Closing the event channel ends the logger.
    drop(orchestrator);
    if let Some(handle) = event_log {
        let _ = handle.await;
    }
    interrupt.abort();

    let open = open_sessions(&reports);
    if open > 0 {
        tracing::warn!(
            sessions = open,
            "some upload sessions could not be released; the remote discards them when they expire"
        );
    }
    Ok(summarize(&reports))
}

/// Forwards orchestrator events to the log.
async fn log_events(mut rx: mpsc::Receiver<UploadEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            UploadEvent::StateChanged { destination, state } => {
                if !state.is_terminal() {
                    tracing::debug!(%destination, ?state, "upload state");
                }
            }
            UploadEvent::ChunkAppended {
                destination,
                index,
                total,
                bytes_sent,
                file_size,
            } => {
                let percent = if file_size == 0 {
                    100.0
                } else {
                    bytes_sent as f64 * 100.0 / file_size as f64
                };
                tracing::info!(
                    %destination,
                    chunk = index + 1,
                    total,
                    bytes_sent,
                    "{percent:.1}% uploaded"
                );
            }
            UploadEvent::RetryScheduled {
                destination,
                chunk_index,
                attempt,
                delay,
                error,
            } => {
                tracing::debug!(
                    %destination,
                    chunk = chunk_index,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "retry scheduled"
                );
            }
            UploadEvent::Completed { .. } | UploadEvent::Failed { .. } => {}
        }
    }
}

/// Prints one line per file and returns the failure count.
fn summarize(reports: &[UploadReport]) -> usize {
    let mut failed = 0;
    for report in reports {
        match &report.result {
            Ok(outcome) => {
                println!(
                    "{} -> {} ({} bytes, {}, rev {})",
                    report.source.display(),
                    outcome.metadata.path_display,
                    outcome.bytes,
                    outcome.strategy,
                    outcome.metadata.rev
                );
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} -> {}: {e}", report.source.display(), report.destination);
            }
        }
    }
    failed
}

/// Failed uploads whose remote session may still be open.
fn open_sessions(reports: &[UploadReport]) -> usize {
    reports
        .iter()
        .filter(|r| r.result.as_ref().is_err_and(|e| e.session_may_be_open()))
        .count()
}
