//! Single-subscription holder for a view that tracks one job at a time.
//!
//! Switching the job closes the previous subscription (and waits for its
//! transport to be released) before the next one is opened, so there is
//! never more than one live subscription per slot.

use crate::client::ProgressClient;
use crate::subscription::ProgressSubscription;

#[derive(Debug)]
pub struct ProgressSlot {
    client: ProgressClient,
    active: Option<ProgressSubscription>,
}

impl ProgressSlot {
    pub fn new(client: ProgressClient) -> Self {
        Self {
            client,
            active: None,
        }
    }

    /// Replace the tracked job.
    ///
    /// Always opens a fresh subscription, even for the job already tracked;
    /// that is how a dropped stream is recovered. `None` just clears.
    pub async fn set_job(&mut self, job_id: Option<&str>) -> Option<&ProgressSubscription> {
        self.clear().await;
        self.active = job_id.map(|id| self.client.subscribe(id));
        self.active.as_ref()
    }

    /// Close the current subscription, if any, and wait for its driver to
    /// exit.
    pub async fn clear(&mut self) {
        if let Some(mut previous) = self.active.take() {
            previous.shutdown().await;
        }
    }

    pub fn current(&self) -> Option<&ProgressSubscription> {
        self.active.as_ref()
    }
}
