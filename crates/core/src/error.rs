use crate::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Job id mismatch: expected {expected}, got {actual}")]
    JobMismatch { expected: JobId, actual: String },
}
