//! Progress snapshot published for a background job.
//!
//! A [`ProgressSnapshot`] is a value type: every inbound progress event
//! produces a complete new snapshot which replaces its predecessor. Nothing
//! is ever merged field by field.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::JobId;

/// Upper bound of [`ProgressSnapshot::percent_complete`].
pub const MAX_PERCENT: u8 = 100;

/// Lifecycle phase of a background job.
///
/// Accepts both the canonical names and the names used by the document
/// ingestion publisher (`started`, `processing`, `error`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    #[serde(alias = "started")]
    Pending,
    #[serde(alias = "processing")]
    Running,
    Completed,
    #[serde(alias = "error")]
    Failed,
}

impl JobPhase {
    /// `completed` and `failed` are terminal; no transition follows them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The latest known state of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    /// Human-readable subject, usually the originating filename.
    pub label: String,
    pub phase: JobPhase,
    pub step_description: String,
    /// `0..=100`. Only meaningful while the phase is non-terminal.
    pub percent_complete: u8,
    pub step_index: Option<u32>,
    pub step_total: Option<u32>,
    pub detail: Option<String>,
    /// Present only when `phase == Failed`.
    pub failure_reason: Option<String>,
    /// Present only when `phase == Completed`. Forwarded verbatim.
    pub result_summary: Option<serde_json::Value>,
}

impl ProgressSnapshot {
    /// Synthetic `pending` snapshot shown before the publisher confirms
    /// anything.
    pub fn seeded(job_id: JobId, step_description: impl Into<String>) -> Self {
        Self {
            label: String::new(),
            job_id,
            phase: JobPhase::Pending,
            step_description: step_description.into(),
            percent_complete: 0,
            step_index: None,
            step_total: None,
            detail: None,
            failure_reason: None,
            result_summary: None,
        }
    }

    /// Check the field invariants of a snapshot.
    ///
    /// Phase-gated fields (`failure_reason`, `result_summary`) must only be
    /// set for their phase; percent must be in range; step counters must
    /// satisfy `step_index <= step_total` when both are present.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.percent_complete > MAX_PERCENT {
            return Err(CoreError::Validation(format!(
                "percent_complete {} exceeds {MAX_PERCENT}",
                self.percent_complete
            )));
        }
        if let (Some(index), Some(total)) = (self.step_index, self.step_total) {
            if index > total {
                return Err(CoreError::Validation(format!(
                    "step_index {index} exceeds step_total {total}"
                )));
            }
        }
        if self.failure_reason.is_some() && self.phase != JobPhase::Failed {
            return Err(CoreError::Validation(
                "failure_reason is only allowed in the failed phase".into(),
            ));
        }
        if self.result_summary.is_some() && self.phase != JobPhase::Completed {
            return Err(CoreError::Validation(
                "result_summary is only allowed in the completed phase".into(),
            ));
        }
        Ok(())
    }
}
