//! Receive-only transport to the progress publisher.
//!
//! [`ProgressTransport`] is the capability the subscription needs: open a
//! long-lived stream of raw event payloads for one job. A successful
//! [`connect`](ProgressTransport::connect) is the handshake; each stream
//! item is one payload or a transport error; the end of the stream is the
//! server closing the connection; dropping the stream closes it from our
//! side.
//!
//! [`HttpEventSource`] implements it over HTTP `text/event-stream` using
//! [`reqwest`].

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream};
use futures::StreamExt;
use studydesk_core::JobId;

use crate::config::ProgressConfig;
use crate::sse::EventStreamDecoder;

/// Stream of raw payloads delivered by a transport.
pub type TransportStream = BoxStream<'static, Result<String, TransportError>>;

/// Errors raised by a transport, either while connecting or mid-stream.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to establish the connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The publisher answered the handshake with a non-2xx status.
    #[error("Publisher rejected stream ({status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// An established stream failed while reading.
    #[error("Stream error: {0}")]
    Stream(String),
}

/// Capability to open a receive-only progress stream for a job.
#[async_trait]
pub trait ProgressTransport: Send + Sync + 'static {
    async fn connect(&self, job_id: &JobId) -> Result<TransportStream, TransportError>;
}

// ---------------------------------------------------------------------------
// HttpEventSource
// ---------------------------------------------------------------------------

/// Event-stream transport against `GET {base_url}/api/progress/stream/{job_id}`.
pub struct HttpEventSource {
    client: reqwest::Client,
    config: ProgressConfig,
}

impl HttpEventSource {
    /// Build a transport with its own HTTP client.
    ///
    /// Only a connect timeout is configured; the stream itself is
    /// long-lived and must not be cut by a request timeout.
    pub fn new(config: ProgressConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Connection(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ProgressTransport for HttpEventSource {
    async fn connect(&self, job_id: &JobId) -> Result<TransportStream, TransportError> {
        let url = self
            .config
            .stream_url(job_id.as_str())
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| TransportError::Connection(format!("Failed to connect to {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(job_id = %job_id, url = %url, "Progress stream opened");

        Ok(decode_body(response.bytes_stream().boxed()).boxed())
    }
}

/// Turn a chunked response body into a stream of event payloads.
///
/// A body error is yielded once and ends the stream. A trailing event that
/// was never terminated by a blank line is discarded.
fn decode_body<S, B, E>(body: S) -> impl Stream<Item = Result<String, TransportError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = DecodeState {
        body,
        decoder: EventStreamDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };
    futures::stream::unfold(state, DecodeState::next_payload)
}

/// State threaded through the body-decoding stream.
struct DecodeState<S> {
    body: S,
    decoder: EventStreamDecoder,
    ready: VecDeque<String>,
    finished: bool,
}

impl<S, B, E> DecodeState<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    async fn next_payload(mut self) -> Option<(Result<String, TransportError>, Self)> {
        loop {
            if let Some(payload) = self.ready.pop_front() {
                return Some((Ok(payload), self));
            }
            if self.finished {
                return None;
            }
            match self.body.next().await {
                Some(Ok(chunk)) => {
                    let payloads = self.decoder.feed(chunk.as_ref());
                    self.ready.extend(payloads);
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some((Err(TransportError::Stream(e.to_string())), self));
                }
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use futures::stream;

    use super::*;

    type Chunk = Result<&'static str, String>;

    async fn decode(chunks: Vec<Chunk>) -> Vec<Result<String, TransportError>> {
        decode_body(stream::iter(chunks)).collect().await
    }

    #[tokio::test]
    async fn payloads_split_across_chunks_are_reassembled() {
        let items = decode(vec![
            Ok("data: {\"status\":"),
            Ok("\"processing\"}\n"),
            Ok("\n: keepalive\n\n"),
        ])
        .await;

        assert_eq!(items.len(), 1);
        assert_matches!(&items[0], Ok(p) if p == r#"{"status":"processing"}"#);
    }

    #[tokio::test]
    async fn several_payloads_in_one_chunk_keep_their_order() {
        let items = decode(vec![Ok("data: 1\n\ndata: 2\n\ndata: 3\n\n")]).await;

        let payloads: Vec<String> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(payloads, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn body_error_is_yielded_once_and_ends_the_stream() {
        let items = decode(vec![
            Ok("data: 1\n\n"),
            Err("connection reset".to_string()),
            Ok("data: 2\n\n"),
        ])
        .await;

        assert_eq!(items.len(), 2);
        assert_matches!(&items[0], Ok(p) if p == "1");
        assert_matches!(&items[1], Err(TransportError::Stream(msg)) if msg == "connection reset");
    }

    #[tokio::test]
    async fn unterminated_trailing_event_is_dropped() {
        let items = decode(vec![Ok("data: 1\n\ndata: partial\n")]).await;

        assert_eq!(items.len(), 1);
        assert_matches!(&items[0], Ok(p) if p == "1");
    }

    #[tokio::test]
    async fn empty_body_yields_nothing() {
        assert!(decode(Vec::new()).await.is_empty());
    }
}
