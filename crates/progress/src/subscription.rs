//! Handle to one live progress subscription.
//!
//! A [`ProgressSubscription`] owns a background driver task (see
//! [`processor`](crate::processor)) that is the single writer of the
//! subscription's state. The handle exposes the latest state read-only,
//! accepts terminal callbacks and listeners, and tears everything down on
//! [`close`](ProgressSubscription::close) or when dropped.

use std::sync::{Arc, Mutex, MutexGuard};

use studydesk_core::{JobId, ProgressSnapshot};
use studydesk_events::{ListenerRegistry, ListenerToken};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SubscriptionConfig;
use crate::events::{
    ConnectionStatus, Lifecycle, SubscriptionEvent, SubscriptionView, TerminalOutcome,
};
use crate::processor;
use crate::transport::ProgressTransport;

type CompletedCallback = Box<dyn FnOnce(Option<serde_json::Value>) + Send>;
type FailedCallback = Box<dyn FnOnce(String) + Send>;

// ---------------------------------------------------------------------------
// Terminal callback slot
// ---------------------------------------------------------------------------

/// Holds the terminal callbacks and guarantees that, between them, at most
/// one is ever invoked.
#[derive(Default)]
struct TerminalSlot {
    outcome: Option<TerminalOutcome>,
    fired: bool,
    closed: bool,
    on_completed: Option<CompletedCallback>,
    on_failed: Option<FailedCallback>,
}

/// A callback taken out of the slot, ready to run without the lock held.
enum Delivery {
    Completed(CompletedCallback, Option<serde_json::Value>),
    Failed(FailedCallback, String),
}

impl Delivery {
    fn run(self) {
        match self {
            Self::Completed(callback, summary) => callback(summary),
            Self::Failed(callback, reason) => callback(reason),
        }
    }
}

impl TerminalSlot {
    /// Record the first terminal outcome; later ones are ignored.
    fn record(&mut self, outcome: TerminalOutcome) -> Option<Delivery> {
        if self.outcome.is_some() || self.closed {
            return None;
        }
        self.outcome = Some(outcome);
        self.take_ready()
    }

    fn take_ready(&mut self) -> Option<Delivery> {
        if self.fired || self.closed {
            return None;
        }
        let delivery = match self.outcome.as_ref()? {
            TerminalOutcome::Completed(summary) => {
                Delivery::Completed(self.on_completed.take()?, summary.clone())
            }
            TerminalOutcome::Failed(reason) => {
                Delivery::Failed(self.on_failed.take()?, reason.clone())
            }
        };
        self.fired = true;
        self.on_completed = None;
        self.on_failed = None;
        Some(delivery)
    }

    fn close(&mut self) {
        self.closed = true;
        self.on_completed = None;
        self.on_failed = None;
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared between the handle and its driver task.
///
/// Only the driver mutates the view while the subscription is open; the
/// handle only ever closes it.
pub(crate) struct Shared {
    pub(crate) id: Uuid,
    pub(crate) job_id: Option<JobId>,
    pub(crate) cancel: CancellationToken,
    view_tx: watch::Sender<SubscriptionView>,
    listeners: ListenerRegistry<SubscriptionEvent>,
    terminal: Mutex<TerminalSlot>,
}

impl Shared {
    fn new(job_id: Option<JobId>, view: SubscriptionView) -> Self {
        let (view_tx, _) = watch::channel(view);
        Self {
            id: Uuid::new_v4(),
            job_id,
            cancel: CancellationToken::new(),
            view_tx,
            listeners: ListenerRegistry::new(),
            terminal: Mutex::new(TerminalSlot::default()),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn set_connection(&self, status: ConnectionStatus) {
        let changed = self.view_tx.send_if_modified(|view| {
            if self.is_closed() || view.connection == status {
                return false;
            }
            view.connection = status;
            view.updated_at = chrono::Utc::now();
            true
        });
        if changed {
            self.notify(SubscriptionEvent::ConnectionChanged(status));
        }
    }

    /// Replace the current snapshot wholesale.
    pub(crate) fn replace_snapshot(&self, snapshot: Arc<ProgressSnapshot>) {
        let changed = self.view_tx.send_if_modified(|view| {
            if self.is_closed() {
                return false;
            }
            view.lifecycle = Lifecycle::from_phase(snapshot.phase);
            view.snapshot = Some(Arc::clone(&snapshot));
            view.updated_at = chrono::Utc::now();
            true
        });
        if changed {
            self.notify(SubscriptionEvent::SnapshotReplaced(snapshot));
        }
    }

    /// Record the terminal outcome and run the matching callback, if one is
    /// registered.
    pub(crate) fn record_outcome(&self, outcome: TerminalOutcome) {
        let delivery = self.lock_terminal().record(outcome);
        if let Some(delivery) = delivery {
            delivery.run();
        }
    }

    /// Final transition after the terminal grace delay.
    pub(crate) fn finish(&self) {
        let changed = self.view_tx.send_if_modified(|view| {
            if self.is_closed() {
                return false;
            }
            view.connection = ConnectionStatus::Disconnected;
            view.lifecycle = Lifecycle::Closed;
            view.updated_at = chrono::Utc::now();
            true
        });
        if changed {
            self.notify(SubscriptionEvent::ConnectionChanged(
                ConnectionStatus::Disconnected,
            ));
            self.notify(SubscriptionEvent::Closed);
        }
        self.close();
    }

    /// Cancel the driver, drop callbacks and listeners, and mark the view
    /// closed. Returns `false` if already closed.
    pub(crate) fn close(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.cancel.cancel();
        self.lock_terminal().close();
        self.listeners.clear();
        self.view_tx.send_if_modified(|view| {
            if view.lifecycle == Lifecycle::Closed {
                return false;
            }
            view.lifecycle = Lifecycle::Closed;
            view.connection = ConnectionStatus::Disconnected;
            view.updated_at = chrono::Utc::now();
            true
        });
        true
    }

    fn notify(&self, event: SubscriptionEvent) {
        if !self.is_closed() {
            self.listeners.notify(&event);
        }
    }

    fn lock_terminal(&self) -> MutexGuard<'_, TerminalSlot> {
        // Callbacks never run under this lock.
        self.terminal.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// ProgressSubscription
// ---------------------------------------------------------------------------

/// Owned handle to a subscription for one job id.
///
/// Dropping the handle closes the subscription and releases the transport;
/// no subscription outlives its owner.
pub struct ProgressSubscription {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl ProgressSubscription {
    /// Handle for "no active job": never connects and never emits.
    pub(crate) fn inert() -> Self {
        Self {
            shared: Arc::new(Shared::new(None, SubscriptionView::inert())),
            task: None,
        }
    }

    /// Seed the pending snapshot and spawn the driver task.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn spawn(
        job_id: JobId,
        transport: Arc<dyn ProgressTransport>,
        config: &SubscriptionConfig,
    ) -> Self {
        let seeded = ProgressSnapshot::seeded(job_id.clone(), config.connecting_label.clone());
        let shared = Arc::new(Shared::new(Some(job_id), SubscriptionView::seeded(seeded)));

        tracing::debug!(
            subscription_id = %shared.id,
            job_id = ?shared.job_id,
            "Opening progress subscription",
        );

        let task = tokio::spawn(processor::run_subscription(
            transport,
            Arc::clone(&shared),
            config.clone(),
        ));

        Self {
            shared,
            task: Some(task),
        }
    }

    /// Unique id of this subscription instance, used in logs.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// `None` for the inert handle.
    pub fn job_id(&self) -> Option<&JobId> {
        self.shared.job_id.as_ref()
    }

    pub fn view(&self) -> SubscriptionView {
        self.shared.view_tx.borrow().clone()
    }

    pub fn snapshot(&self) -> Option<Arc<ProgressSnapshot>> {
        self.shared.view_tx.borrow().snapshot.clone()
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.shared.view_tx.borrow().connection
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.view_tx.borrow().lifecycle
    }

    /// Receiver that always holds the latest [`SubscriptionView`].
    pub fn watch(&self) -> watch::Receiver<SubscriptionView> {
        self.shared.view_tx.subscribe()
    }

    /// Register a change listener. Returns a token for
    /// [`unregister`](Self::unregister).
    ///
    /// Listeners run on the driver task and must not block.
    pub fn register<F>(&self, listener: F) -> ListenerToken
    where
        F: Fn(&SubscriptionEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.register(listener)
    }

    pub fn unregister(&self, token: ListenerToken) -> bool {
        self.shared.listeners.unregister(token)
    }

    /// Set the callback run with the `result_summary` when the job
    /// completes.
    ///
    /// Replaces a previously set completion callback. If the completed
    /// snapshot was already observed (and no terminal callback has run yet)
    /// the callback runs immediately on the calling thread.
    pub fn on_completed<F>(&self, callback: F)
    where
        F: FnOnce(Option<serde_json::Value>) + Send + 'static,
    {
        let delivery = {
            let mut slot = self.shared.lock_terminal();
            if slot.closed || slot.fired {
                return;
            }
            slot.on_completed = Some(Box::new(callback));
            slot.take_ready()
        };
        if let Some(delivery) = delivery {
            delivery.run();
        }
    }

    /// Set the callback run with the `failure_reason` when the job fails.
    ///
    /// Same replacement and late-registration rules as
    /// [`on_completed`](Self::on_completed).
    pub fn on_failed<F>(&self, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        let delivery = {
            let mut slot = self.shared.lock_terminal();
            if slot.closed || slot.fired {
                return;
            }
            slot.on_failed = Some(Box::new(callback));
            slot.take_ready()
        };
        if let Some(delivery) = delivery {
            delivery.run();
        }
    }

    /// Release the transport and stop all notifications.
    ///
    /// Idempotent: safe to call any number of times, in any state. A
    /// delivery already running on the driver task may still finish; use
    /// [`shutdown`](Self::shutdown) to wait for the driver to exit.
    pub fn close(&self) {
        if self.shared.close() {
            tracing::debug!(
                subscription_id = %self.shared.id,
                job_id = ?self.shared.job_id,
                "Progress subscription closed",
            );
        }
    }

    /// Alias of [`close`](Self::close).
    pub fn unsubscribe(&self) {
        self.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Close and wait for the driver task to exit, so the transport is
    /// guaranteed to be released when this returns.
    pub async fn shutdown(&mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(
                        subscription_id = %self.shared.id,
                        error = %e,
                        "Progress driver task panicked",
                    );
                }
            }
        }
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ProgressSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSubscription")
            .field("id", &self.shared.id)
            .field("job_id", &self.shared.job_id)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting_slot() -> (TerminalSlot, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let mut slot = TerminalSlot::default();
        let c = Arc::clone(&count);
        slot.on_completed = Some(Box::new(move |_: Option<serde_json::Value>| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        let c = Arc::clone(&count);
        slot.on_failed = Some(Box::new(move |_: String| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        (slot, count)
    }

    #[test]
    fn first_outcome_wins_and_fires_once() {
        let (mut slot, count) = counting_slot();
        if let Some(d) = slot.record(TerminalOutcome::Completed(None)) {
            d.run();
        }
        assert!(slot.record(TerminalOutcome::Failed("late".into())).is_none());
        assert!(slot.record(TerminalOutcome::Completed(None)).is_none());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(slot.on_failed.is_none());
    }

    #[test]
    fn outcome_without_matching_callback_is_held() {
        let mut slot = TerminalSlot::default();
        assert!(slot.record(TerminalOutcome::Failed("boom".into())).is_none());

        slot.on_failed = Some(Box::new(|reason: String| assert_eq!(reason, "boom")));
        let delivery = slot.take_ready();
        assert!(matches!(delivery, Some(Delivery::Failed(_, _))));
        assert!(slot.take_ready().is_none());
    }

    #[test]
    fn closed_slot_never_delivers() {
        let (mut slot, count) = counting_slot();
        slot.close();
        assert!(slot.record(TerminalOutcome::Completed(None)).is_none());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn inert_handle_is_uninitialized_and_closes_cleanly() {
        let sub = ProgressSubscription::inert();
        assert!(sub.job_id().is_none());
        assert!(sub.snapshot().is_none());
        assert_eq!(sub.lifecycle(), Lifecycle::Uninitialized);
        assert_eq!(sub.connection(), ConnectionStatus::Disconnected);

        sub.close();
        sub.close();
        assert!(sub.is_closed());
        assert_eq!(sub.lifecycle(), Lifecycle::Closed);
    }
}
