//! Progress event payloads and parser.
//!
//! The publisher sends one JSON object per event. Both the canonical field
//! names (`job_id`, `phase`, `percent_complete`, ...) and the names used by
//! the document ingestion service (`document_id`, `status`, `progress`, ...)
//! are accepted, and a payload may carry both. Unknown fields are ignored;
//! missing optional fields stay absent rather than defaulting to zero.

use serde::Deserialize;
use studydesk_core::progress::MAX_PERCENT;
use studydesk_core::{CoreError, JobId, JobPhase, ProgressSnapshot};

/// One progress event, with the canonical and publisher field names merged.
///
/// When a payload carries both names for a field, the canonical one wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "WirePayload")]
pub struct ProgressPayload {
    pub job_id: Option<String>,
    pub label: Option<String>,
    pub phase: JobPhase,
    pub step_description: Option<String>,
    /// Kept as a float so `40.0` is accepted; range-checked on conversion.
    pub percent_complete: Option<f64>,
    pub step_index: Option<u32>,
    pub step_total: Option<u32>,
    pub detail: Option<String>,
    pub failure_reason: Option<String>,
    pub result_summary: Option<serde_json::Value>,
}

/// Raw wire shape. Each pair is (canonical, publisher) name.
#[derive(Default, Deserialize)]
#[serde(default)]
struct WirePayload {
    job_id: Option<String>,
    document_id: Option<String>,
    label: Option<String>,
    filename: Option<String>,
    phase: Option<JobPhase>,
    status: Option<JobPhase>,
    step_description: Option<String>,
    step: Option<String>,
    percent_complete: Option<f64>,
    progress: Option<f64>,
    step_index: Option<u32>,
    current_step: Option<u32>,
    step_total: Option<u32>,
    total_steps: Option<u32>,
    detail: Option<String>,
    details: Option<String>,
    failure_reason: Option<String>,
    error: Option<String>,
    result_summary: Option<serde_json::Value>,
    results: Option<serde_json::Value>,
}

impl TryFrom<WirePayload> for ProgressPayload {
    type Error = String;

    fn try_from(wire: WirePayload) -> Result<Self, Self::Error> {
        let phase = wire
            .phase
            .or(wire.status)
            .ok_or_else(|| "missing field `phase` (or `status`)".to_string())?;
        Ok(Self {
            job_id: wire.job_id.or(wire.document_id),
            label: wire.label.or(wire.filename),
            phase,
            step_description: wire.step_description.or(wire.step),
            percent_complete: wire.percent_complete.or(wire.progress),
            step_index: wire.step_index.or(wire.current_step),
            step_total: wire.step_total.or(wire.total_steps),
            detail: wire.detail.or(wire.details),
            failure_reason: wire.failure_reason.or(wire.error),
            result_summary: wire.result_summary.or(wire.results),
        })
    }
}

/// Why an inbound message could not become a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Not JSON, or JSON of the wrong shape (unknown phase, wrong types).
    #[error("Malformed progress payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Well-formed but violating a snapshot invariant or naming another job.
    #[error(transparent)]
    Invalid(#[from] CoreError),
}

impl ProgressPayload {
    /// Convert the payload into a complete snapshot for `job_id`.
    ///
    /// A missing `job_id` is filled in from the subscription. Phase-gated
    /// fields that do not match the phase are dropped.
    pub fn into_snapshot(self, job_id: &JobId) -> Result<ProgressSnapshot, ParseError> {
        if let Some(reported) = self.job_id.as_deref() {
            if reported != job_id.as_str() {
                return Err(CoreError::JobMismatch {
                    expected: job_id.clone(),
                    actual: reported.to_string(),
                }
                .into());
            }
        }

        let percent_complete = match self.percent_complete {
            None => 0,
            Some(p) if (0.0..=f64::from(MAX_PERCENT)).contains(&p) => p.round() as u8,
            Some(p) => {
                return Err(CoreError::Validation(format!(
                    "percent_complete {p} outside 0..={MAX_PERCENT}"
                ))
                .into())
            }
        };

        let failure_reason = match self.phase {
            JobPhase::Failed => self.failure_reason,
            _ => None,
        };
        let result_summary = match self.phase {
            JobPhase::Completed => self.result_summary,
            _ => None,
        };

        let snapshot = ProgressSnapshot {
            job_id: job_id.clone(),
            label: self.label.unwrap_or_default(),
            phase: self.phase,
            step_description: self.step_description.unwrap_or_default(),
            percent_complete,
            step_index: self.step_index,
            step_total: self.step_total,
            detail: self.detail,
            failure_reason,
            result_summary,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Parse a raw event payload into a snapshot for `job_id`.
///
/// Callers should log the error and keep the previous snapshot.
pub fn parse_progress(text: &str, job_id: &JobId) -> Result<ProgressSnapshot, ParseError> {
    let payload: ProgressPayload = serde_json::from_str(text)?;
    payload.into_snapshot(job_id)
}
