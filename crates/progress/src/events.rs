//! Observable state and notifications of a progress subscription.
//!
//! [`SubscriptionView`] is the value consumers render; it is published on a
//! `tokio::sync::watch` channel so late observers always start from the
//! latest state. [`SubscriptionEvent`] is what registered listeners receive
//! on every change.

use std::sync::Arc;

use serde::Serialize;
use studydesk_core::{JobId, JobPhase, ProgressSnapshot, Timestamp};

/// Connectivity of the underlying transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Lifecycle state of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Inert handle created for an empty job id; never emits.
    Uninitialized,
    Pending,
    Running,
    Completed,
    Failed,
    /// Transport released after close or after the terminal grace delay.
    Closed,
}

impl Lifecycle {
    pub(crate) fn from_phase(phase: JobPhase) -> Self {
        match phase {
            JobPhase::Pending => Self::Pending,
            JobPhase::Running => Self::Running,
            JobPhase::Completed => Self::Completed,
            JobPhase::Failed => Self::Failed,
        }
    }
}

/// Read-only view of a subscription, replaced wholesale on every change.
#[derive(Debug, Clone)]
pub struct SubscriptionView {
    /// `None` only for the inert handle.
    pub job_id: Option<JobId>,
    pub snapshot: Option<Arc<ProgressSnapshot>>,
    pub connection: ConnectionStatus,
    pub lifecycle: Lifecycle,
    /// When this view was last replaced.
    pub updated_at: Timestamp,
}

impl SubscriptionView {
    pub(crate) fn inert() -> Self {
        Self {
            job_id: None,
            snapshot: None,
            connection: ConnectionStatus::Disconnected,
            lifecycle: Lifecycle::Uninitialized,
            updated_at: chrono::Utc::now(),
        }
    }

    pub(crate) fn seeded(snapshot: ProgressSnapshot) -> Self {
        Self {
            job_id: Some(snapshot.job_id.clone()),
            lifecycle: Lifecycle::from_phase(snapshot.phase),
            snapshot: Some(Arc::new(snapshot)),
            connection: ConnectionStatus::Connecting,
            updated_at: chrono::Utc::now(),
        }
    }

    /// The phase of the latest snapshot, if any.
    pub fn phase(&self) -> Option<JobPhase> {
        self.snapshot.as_ref().map(|s| s.phase)
    }

    /// True when the transport is gone while the job was still in flight.
    ///
    /// This is when a UI shows its "reconnecting" affordance; recovering is
    /// up to the caller (re-subscribe with the same job id).
    pub fn is_reconnecting(&self) -> bool {
        self.connection == ConnectionStatus::Disconnected
            && matches!(self.lifecycle, Lifecycle::Pending | Lifecycle::Running)
    }

    /// True once nothing more will change: closed, or dropped before a
    /// terminal snapshot arrived.
    pub fn is_settled(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Closed | Lifecycle::Uninitialized)
            || self.is_reconnecting()
    }
}

/// Change notification delivered to registered listeners.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    /// A new snapshot replaced the previous one.
    SnapshotReplaced(Arc<ProgressSnapshot>),

    /// The transport connectivity changed.
    ConnectionChanged(ConnectionStatus),

    /// The grace delay after a terminal snapshot elapsed and the transport
    /// was released.
    Closed,
}

/// Terminal outcome observed on the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalOutcome {
    /// Carries the `result_summary`, forwarded verbatim.
    Completed(Option<serde_json::Value>),
    /// Carries the `failure_reason`.
    Failed(String),
}
