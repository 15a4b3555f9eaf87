use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use studydesk_core::JobId;
use studydesk_progress::{
    ProgressClient, ProgressTransport, SubscriptionConfig, TransportError, TransportStream,
};

type Feed = mpsc::UnboundedSender<Result<String, TransportError>>;

/// In-memory transport: every `connect` opens a channel the test feeds by
/// hand.
#[derive(Default)]
pub struct ScriptedTransport {
    feeds: Mutex<Vec<(JobId, Feed)>>,
    refuse: Mutex<bool>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following `connect` fail.
    pub fn refuse_connections(&self) {
        *self.refuse.lock().unwrap() = true;
    }

    /// Feed of the `index`-th connection.
    pub fn feed(&self, index: usize) -> Feed {
        self.feeds.lock().unwrap()[index].1.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.feeds.lock().unwrap().len()
    }

    pub fn connected_job(&self, index: usize) -> JobId {
        self.feeds.lock().unwrap()[index].0.clone()
    }

    /// Send one raw payload on the `index`-th connection.
    pub fn send(&self, index: usize, payload: &str) {
        self.feed(index)
            .unbounded_send(Ok(payload.to_string()))
            .expect("stream already released");
    }

    /// Fail the `index`-th connection mid-stream.
    pub fn fail(&self, index: usize, message: &str) {
        self.feed(index)
            .unbounded_send(Err(TransportError::Stream(message.to_string())))
            .expect("stream already released");
    }

    /// Close the `index`-th connection from the publisher side.
    pub fn end(&self, index: usize) {
        self.feed(index).close_channel();
    }

    /// Whether the subscriber dropped the `index`-th stream.
    pub fn is_released(&self, index: usize) -> bool {
        self.feed(index).is_closed()
    }
}

#[async_trait]
impl ProgressTransport for ScriptedTransport {
    async fn connect(&self, job_id: &JobId) -> Result<TransportStream, TransportError> {
        if *self.refuse.lock().unwrap() {
            return Err(TransportError::Connection("connection refused".into()));
        }
        let (tx, rx) = mpsc::unbounded();
        self.feeds.lock().unwrap().push((job_id.clone(), tx));
        Ok(rx.boxed())
    }
}

pub fn test_config() -> SubscriptionConfig {
    SubscriptionConfig {
        completed_grace: Duration::from_millis(1_000),
        failed_grace: Duration::from_millis(5_000),
        connecting_label: "Connecting...".to_string(),
    }
}

pub fn test_client(transport: &Arc<ScriptedTransport>) -> ProgressClient {
    ProgressClient::new(transport.clone(), test_config())
}

/// Let spawned tasks run until they block again. Does not advance time.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Await `fut`, failing the test if it does not finish within a minute of
/// (possibly paused) runtime time.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(60), fut)
        .await
        .expect("timed out waiting")
}

pub fn running(job: &str, percent: u8) -> String {
    format!(
        r#"{{"document_id":"{job}","filename":"notes.pdf","status":"processing","step":"Extracting","progress":{percent},"current_step":1,"total_steps":4}}"#
    )
}

pub fn completed(job: &str) -> String {
    format!(
        r#"{{"document_id":"{job}","filename":"notes.pdf","status":"completed","step":"Done","progress":100,"results":{{"chunks_created":12,"flashcards_generated":30}}}}"#
    )
}

pub fn failed(job: &str, reason: &str) -> String {
    format!(r#"{{"document_id":"{job}","status":"error","error":"{reason}"}}"#)
}
