//! Entry point for opening progress subscriptions.
//!
//! [`ProgressClient`] pairs a [`ProgressTransport`] with the per-subscription
//! settings. Call [`ProgressClient::subscribe`] to open a
//! [`ProgressSubscription`] for a job id.

use std::sync::Arc;

use studydesk_core::JobId;

use crate::config::{ProgressConfig, SubscriptionConfig};
use crate::subscription::ProgressSubscription;
use crate::transport::{HttpEventSource, ProgressTransport, TransportError};

/// Opens subscriptions over a shared transport. Cheap to clone.
#[derive(Clone)]
pub struct ProgressClient {
    transport: Arc<dyn ProgressTransport>,
    config: SubscriptionConfig,
}

impl ProgressClient {
    pub fn new(transport: Arc<dyn ProgressTransport>, config: SubscriptionConfig) -> Self {
        Self { transport, config }
    }

    /// Client using the HTTP event-stream transport described by `config`.
    pub fn from_config(config: ProgressConfig) -> Result<Self, TransportError> {
        let subscription = config.subscription.clone();
        let transport = HttpEventSource::new(config)?;
        Ok(Self::new(Arc::new(transport), subscription))
    }

    /// Open a subscription for `job_id`.
    ///
    /// The returned handle already holds a pending snapshot labelled with
    /// the connecting message. An empty (or all-whitespace) id yields an
    /// inert handle that never connects.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self, job_id: &str) -> ProgressSubscription {
        match JobId::parse(job_id) {
            Some(job_id) => {
                ProgressSubscription::spawn(job_id, Arc::clone(&self.transport), &self.config)
            }
            None => {
                tracing::debug!("Empty job id, returning inert subscription");
                ProgressSubscription::inert()
            }
        }
    }
}

impl std::fmt::Debug for ProgressClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
