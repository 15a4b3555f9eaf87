//! One-shot status queries against the progress publisher.
//!
//! Wraps `GET /api/progress/status/{job_id}` using [`reqwest`]. Useful to
//! show the last known state of a job without opening a stream.

use studydesk_core::{JobId, ProgressSnapshot};

use crate::config::{ConfigError, ProgressConfig};
use crate::messages::{ParseError, ProgressPayload};

/// Status value the publisher reports for a job it has no record of.
const STATUS_NOT_FOUND: &str = "not_found";

/// HTTP client for the publisher's status endpoint.
pub struct ProgressApi {
    client: reqwest::Client,
    config: ProgressConfig,
}

/// Errors from the status query.
#[derive(Debug, thiserror::Error)]
pub enum ProgressApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The publisher returned a non-2xx status code.
    #[error("Progress API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The configured base URL cannot address the endpoint.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The body was not a valid progress record.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ProgressApi {
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Fetch the current progress record for `job_id`.
    ///
    /// Returns `Ok(None)` when the publisher has no record of the job.
    pub async fn fetch_status(
        &self,
        job_id: &JobId,
    ) -> Result<Option<ProgressSnapshot>, ProgressApiError> {
        let url = self.config.status_url(job_id.as_str())?;
        let response = self.client.get(url).send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        parse_status(&body, job_id)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ProgressApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProgressApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProgressApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Interpret a status response body.
pub fn parse_status(
    body: &str,
    job_id: &JobId,
) -> Result<Option<ProgressSnapshot>, ProgressApiError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(ParseError::from)?;
    if value.get("status").and_then(serde_json::Value::as_str) == Some(STATUS_NOT_FOUND) {
        return Ok(None);
    }
    let payload: ProgressPayload = serde_json::from_value(value).map_err(ParseError::from)?;
    Ok(Some(payload.into_snapshot(job_id)?))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use studydesk_core::JobPhase;

    use super::*;

    fn job() -> JobId {
        JobId::parse("doc-1").unwrap()
    }

    #[test]
    fn unknown_job_is_none() {
        let body = r#"{"document_id":"doc-1","status":"not_found","message":"No progress data available for this document"}"#;
        assert!(parse_status(body, &job()).unwrap().is_none());
    }

    #[test]
    fn known_job_becomes_snapshot() {
        let body = r#"{"document_id":"doc-1","filename":"a.pdf","status":"processing","step":"Embedding","progress":60}"#;
        let snap = parse_status(body, &job()).unwrap().unwrap();
        assert_eq!(snap.phase, JobPhase::Running);
        assert_eq!(snap.percent_complete, 60);
    }

    #[test]
    fn garbage_body_is_a_parse_error() {
        assert_matches!(
            parse_status("<html>", &job()),
            Err(ProgressApiError::Parse(ParseError::Json(_)))
        );
    }
}
