//! Subscription driver loop.
//!
//! One driver task runs per open subscription. It connects the transport,
//! parses each payload into a [`ProgressSnapshot`], publishes it through
//! the shared view, fires the terminal callback and, after the grace delay,
//! releases the transport. It is the only writer of the subscription state.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use studydesk_core::{JobId, JobPhase, ProgressSnapshot};

use crate::config::SubscriptionConfig;
use crate::events::{ConnectionStatus, TerminalOutcome};
use crate::messages::parse_progress;
use crate::subscription::Shared;
use crate::transport::{ProgressTransport, TransportError, TransportStream};

/// Failure reason reported when a `failed` snapshot carries none.
pub const UNKNOWN_FAILURE: &str = "unknown error";

/// Drive one subscription until it closes.
///
/// Exits when the handle is closed, when the transport fails or ends before
/// a terminal snapshot, or when the grace delay after a terminal snapshot
/// elapses. The transport stream is dropped on every exit path.
pub(crate) async fn run_subscription(
    transport: Arc<dyn ProgressTransport>,
    shared: Arc<Shared>,
    config: SubscriptionConfig,
) {
    let Some(job_id) = shared.job_id.clone() else {
        return;
    };
    let subscription_id = shared.id;
    let cancel = shared.cancel.clone();

    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!(%subscription_id, %job_id, "Subscription closed before connecting");
            return;
        }
        result = transport.connect(&job_id) => result,
    };

    let mut stream = match connected {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(
                %subscription_id,
                %job_id,
                error = %e,
                "Failed to open progress stream",
            );
            shared.set_connection(ConnectionStatus::Disconnected);
            return;
        }
    };

    tracing::info!(%subscription_id, %job_id, "Progress stream connected");
    shared.set_connection(ConnectionStatus::Connected);

    let outcome = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(%subscription_id, %job_id, "Subscription closed, releasing stream");
                return;
            }
            item = stream.next() => match item {
                Some(Ok(text)) => {
                    if let Some(outcome) = handle_payload(&shared, &job_id, &text) {
                        break outcome;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(%subscription_id, %job_id, error = %e, "Progress stream failed");
                    shared.set_connection(ConnectionStatus::Disconnected);
                    return;
                }
                None => {
                    tracing::info!(%subscription_id, %job_id, "Progress stream closed by publisher");
                    shared.set_connection(ConnectionStatus::Disconnected);
                    return;
                }
            }
        }
    };

    let grace = grace_for(&config, &outcome);
    shared.record_outcome(outcome);

    // Keep the stream open for the grace delay but ignore anything on it.
    let mut stream = Some(stream);
    let deadline = tokio::time::sleep(grace);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(%subscription_id, %job_id, "Subscription closed during grace delay");
                return;
            }
            _ = &mut deadline => break,
            item = next_or_pending(&mut stream) => match item {
                Some(Ok(_)) => {
                    tracing::debug!(%subscription_id, %job_id, "Ignoring event after terminal snapshot");
                }
                Some(Err(_)) | None => stream = None,
            }
        }
    }

    drop(stream);
    tracing::debug!(%subscription_id, %job_id, "Grace delay elapsed, stream released");
    shared.finish();
}

/// Parse and publish one payload. Returns the terminal outcome if the
/// snapshot ends the job.
fn handle_payload(shared: &Shared, job_id: &JobId, text: &str) -> Option<TerminalOutcome> {
    let snapshot = match parse_progress(text, job_id) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(
                subscription_id = %shared.id,
                %job_id,
                error = %e,
                raw_message = %text,
                "Discarding malformed progress event",
            );
            return None;
        }
    };

    tracing::debug!(
        subscription_id = %shared.id,
        %job_id,
        phase = %snapshot.phase,
        percent = snapshot.percent_complete,
        step = %snapshot.step_description,
        terminal = snapshot.phase.is_terminal(),
        "Progress update",
    );

    let outcome = terminal_outcome(&snapshot);
    if let Some(outcome) = &outcome {
        match outcome {
            TerminalOutcome::Completed(_) => {
                tracing::info!(subscription_id = %shared.id, %job_id, "Job completed");
            }
            TerminalOutcome::Failed(reason) => {
                tracing::warn!(subscription_id = %shared.id, %job_id, reason = %reason, "Job failed");
            }
        }
    }

    shared.replace_snapshot(Arc::new(snapshot));
    outcome
}

fn terminal_outcome(snapshot: &ProgressSnapshot) -> Option<TerminalOutcome> {
    match snapshot.phase {
        JobPhase::Completed => Some(TerminalOutcome::Completed(snapshot.result_summary.clone())),
        JobPhase::Failed => Some(TerminalOutcome::Failed(
            snapshot
                .failure_reason
                .clone()
                .unwrap_or_else(|| UNKNOWN_FAILURE.to_string()),
        )),
        JobPhase::Pending | JobPhase::Running => None,
    }
}

fn grace_for(config: &SubscriptionConfig, outcome: &TerminalOutcome) -> Duration {
    match outcome {
        TerminalOutcome::Completed(_) => config.completed_grace,
        TerminalOutcome::Failed(_) => config.failed_grace,
    }
}

/// Next stream item, or never once the stream is gone.
async fn next_or_pending(
    stream: &mut Option<TransportStream>,
) -> Option<Result<String, TransportError>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(json: &str) -> ProgressSnapshot {
        let job = JobId::parse("doc-1").unwrap();
        parse_progress(json, &job).unwrap()
    }

    #[test]
    fn running_snapshot_is_not_terminal() {
        assert!(terminal_outcome(&snapshot(r#"{"status":"processing","progress":10}"#)).is_none());
    }

    #[test]
    fn completed_outcome_carries_summary() {
        let outcome = terminal_outcome(&snapshot(r#"{"status":"completed","results":{"a":1}}"#));
        assert_eq!(
            outcome,
            Some(TerminalOutcome::Completed(Some(serde_json::json!({"a": 1}))))
        );
    }

    #[test]
    fn failed_outcome_without_reason_uses_fallback() {
        let outcome = terminal_outcome(&snapshot(r#"{"status":"error"}"#));
        assert_eq!(outcome, Some(TerminalOutcome::Failed(UNKNOWN_FAILURE.to_string())));
    }

    #[test]
    fn failure_grace_is_the_longer_one() {
        let config = SubscriptionConfig::default();
        assert_eq!(grace_for(&config, &TerminalOutcome::Completed(None)), config.completed_grace);
        assert_eq!(
            grace_for(&config, &TerminalOutcome::Failed("x".into())),
            config.failed_grace
        );
    }
}
