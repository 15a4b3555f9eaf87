//! Shared domain types for the studydesk workspace.
//!
//! Everything here is plain data: identifiers, the progress snapshot
//! published for a background job, and the typed view over the summary a
//! finished ingestion job reports.

pub mod error;
pub mod ingestion;
pub mod progress;
pub mod types;

pub use error::CoreError;
pub use ingestion::IngestionSummary;
pub use progress::{JobPhase, ProgressSnapshot};
pub use types::{JobId, Timestamp};
