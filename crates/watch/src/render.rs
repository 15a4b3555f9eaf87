//! Terminal rendering of subscription views.

use serde::Serialize;
use studydesk_core::{IngestionSummary, ProgressSnapshot, Timestamp};
use studydesk_progress::{ConnectionStatus, Lifecycle, SubscriptionView};

/// One line of `--json` output.
#[derive(Debug, Serialize)]
struct ViewLine<'a> {
    connection: ConnectionStatus,
    lifecycle: Lifecycle,
    reconnecting: bool,
    updated_at: Timestamp,
    snapshot: Option<&'a ProgressSnapshot>,
}

pub fn render_json(view: &SubscriptionView) -> serde_json::Result<String> {
    serde_json::to_string(&ViewLine {
        connection: view.connection,
        lifecycle: view.lifecycle,
        reconnecting: view.is_reconnecting(),
        updated_at: view.updated_at,
        snapshot: view.snapshot.as_deref(),
    })
}

/// Human-readable status line, e.g. `[ 40%] running   Extracting (2/4)`.
pub fn render_text(view: &SubscriptionView) -> String {
    let Some(snap) = view.snapshot.as_deref() else {
        return "no active job".to_string();
    };

    let mut line = format!(
        "[{:>3}%] {:<9} {}",
        snap.percent_complete,
        snap.phase.as_str(),
        snap.step_description
    );
    if let (Some(index), Some(total)) = (snap.step_index, snap.step_total) {
        line.push_str(&format!(" ({index}/{total})"));
    }
    if let Some(detail) = &snap.detail {
        line.push_str(&format!(" - {detail}"));
    }
    if view.is_reconnecting() {
        line.push_str("  [reconnecting...]");
    }
    line
}

/// Message printed once the job completes.
pub fn completion_message(summary: Option<&serde_json::Value>) -> String {
    match summary.and_then(IngestionSummary::from_value) {
        Some(summary) => {
            let mut message = format!("Completed: {}", summary.headline());
            if !summary.errors.is_empty() {
                message.push_str(&format!(" ({} warnings)", summary.errors.len()));
            }
            message
        }
        None => "Completed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use studydesk_core::{JobId, JobPhase};

    use super::*;

    fn view_with(snapshot: ProgressSnapshot, connection: ConnectionStatus) -> SubscriptionView {
        SubscriptionView {
            job_id: Some(snapshot.job_id.clone()),
            lifecycle: match snapshot.phase {
                JobPhase::Pending => Lifecycle::Pending,
                JobPhase::Running => Lifecycle::Running,
                JobPhase::Completed => Lifecycle::Completed,
                JobPhase::Failed => Lifecycle::Failed,
            },
            snapshot: Some(Arc::new(snapshot)),
            connection,
            updated_at: fixed_time(),
        }
    }

    fn fixed_time() -> Timestamp {
        serde_json::from_str("\"2024-03-01T10:00:00Z\"").unwrap()
    }

    fn running() -> ProgressSnapshot {
        let mut snap = ProgressSnapshot::seeded(JobId::parse("doc-1").unwrap(), "Extracting");
        snap.phase = JobPhase::Running;
        snap.percent_complete = 40;
        snap.step_index = Some(2);
        snap.step_total = Some(4);
        snap
    }

    #[test]
    fn text_includes_step_counter() {
        let line = render_text(&view_with(running(), ConnectionStatus::Connected));
        assert_eq!(line, "[ 40%] running   Extracting (2/4)");
    }

    #[test]
    fn text_flags_reconnecting() {
        let line = render_text(&view_with(running(), ConnectionStatus::Disconnected));
        assert!(line.ends_with("[reconnecting...]"));
    }

    #[test]
    fn json_line_carries_snapshot_fields() {
        let line = render_json(&view_with(running(), ConnectionStatus::Connected)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["connection"], "connected");
        assert_eq!(value["lifecycle"], "running");
        assert_eq!(value["reconnecting"], false);
        assert_eq!(value["snapshot"]["percent_complete"], 40);
        assert_eq!(value["snapshot"]["job_id"], "doc-1");
    }

    #[test]
    fn completion_message_uses_ingestion_summary() {
        let summary = serde_json::json!({"chunks_created": 12, "flashcards_generated": 30});
        let message = completion_message(Some(&summary));
        assert!(message.starts_with("Completed: "));
        assert!(message.contains("12 chunks"));
        assert_eq!(completion_message(None), "Completed");
    }
}
