//! Environment-driven settings for the progress client.

use std::time::Duration;

use reqwest::Url;

/// Default base URL of the progress publisher.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Grace delay after a `completed` snapshot before the transport is released.
pub const DEFAULT_COMPLETED_GRACE: Duration = Duration::from_millis(1_000);

/// Grace delay after a `failed` snapshot; longer so the error can be read.
pub const DEFAULT_FAILED_GRACE: Duration = Duration::from_millis(5_000);

/// Default TCP connect timeout for the event stream.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Step description of the synthetic snapshot shown before the publisher
/// has confirmed anything.
pub const DEFAULT_CONNECTING_LABEL: &str = "Connecting...";

/// Per-subscription behaviour, independent of the transport in use.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub completed_grace: Duration,
    pub failed_grace: Duration,
    pub connecting_label: String,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            completed_grace: DEFAULT_COMPLETED_GRACE,
            failed_grace: DEFAULT_FAILED_GRACE,
            connecting_label: DEFAULT_CONNECTING_LABEL.to_string(),
        }
    }
}

/// Progress client configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development against a
/// publisher on `localhost:8000`.
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Base HTTP URL of the publisher, without trailing slash.
    pub base_url: String,
    pub connect_timeout: Duration,
    pub subscription: SubscriptionConfig,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            subscription: SubscriptionConfig::default(),
        }
    }
}

impl ProgressConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                 |
    /// |---------------------------------|-------------------------|
    /// | `PROGRESS_BASE_URL`             | `http://localhost:8000` |
    /// | `PROGRESS_CONNECT_TIMEOUT_SECS` | `10`                    |
    /// | `PROGRESS_COMPLETED_GRACE_MS`   | `1000`                  |
    /// | `PROGRESS_FAILED_GRACE_MS`      | `5000`                  |
    /// | `PROGRESS_CONNECTING_LABEL`     | `Connecting...`         |
    ///
    /// Unparseable numeric values fall back to the default with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from an arbitrary
    /// lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("PROGRESS_BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let connect_timeout = Duration::from_secs(parse_or(
            &lookup,
            "PROGRESS_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT.as_secs(),
        ));

        let completed_grace = Duration::from_millis(parse_or(
            &lookup,
            "PROGRESS_COMPLETED_GRACE_MS",
            DEFAULT_COMPLETED_GRACE.as_millis() as u64,
        ));

        let failed_grace = Duration::from_millis(parse_or(
            &lookup,
            "PROGRESS_FAILED_GRACE_MS",
            DEFAULT_FAILED_GRACE.as_millis() as u64,
        ));

        let connecting_label = lookup("PROGRESS_CONNECTING_LABEL")
            .unwrap_or_else(|| DEFAULT_CONNECTING_LABEL.to_string());

        Self {
            base_url,
            connect_timeout,
            subscription: SubscriptionConfig {
                completed_grace,
                failed_grace,
                connecting_label,
            },
        }
    }

    /// `GET` endpoint streaming progress events for one job.
    pub fn stream_url(&self, job_id: &str) -> Result<Url, ConfigError> {
        self.endpoint("stream", job_id)
    }

    /// `GET` endpoint returning the current progress record once.
    pub fn status_url(&self, job_id: &str) -> Result<Url, ConfigError> {
        self.endpoint("status", job_id)
    }

    /// `{base_url}/api/progress/{kind}/{job_id}`, with the job id
    /// percent-encoded as a single path segment.
    fn endpoint(&self, kind: &str, job_id: &str) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason,
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["api", "progress", kind, job_id]);
        Ok(url)
    }
}

/// Errors from building endpoint URLs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

fn parse_or<F>(lookup: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default, "Invalid numeric setting, using default");
            default
        }),
    }
}
