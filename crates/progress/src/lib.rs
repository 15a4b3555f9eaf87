//! Progress subscription client for long-running ingestion jobs.
//!
//! Opens a receive-only event stream for one job id, parses each event into
//! a typed [`ProgressSnapshot`](studydesk_core::ProgressSnapshot), exposes
//! the latest state and connection status, fires exactly one terminal
//! callback, and releases the stream after a short grace delay.

pub mod api;
pub mod client;
pub mod config;
pub mod events;
pub mod messages;
pub mod processor;
pub mod slot;
pub mod sse;
pub mod subscription;
pub mod transport;

pub use client::ProgressClient;
pub use config::{ConfigError, ProgressConfig, SubscriptionConfig};
pub use events::{ConnectionStatus, Lifecycle, SubscriptionEvent, SubscriptionView, TerminalOutcome};
pub use slot::ProgressSlot;
pub use subscription::ProgressSubscription;
pub use transport::{HttpEventSource, ProgressTransport, TransportError, TransportStream};
