//! Transport port traits.
//!
//! The session and subscription manager (`rx-session`) drives the message
//! bus only through [`Transport`] and the handles it returns — never
//! through `async-nats` directly. That keeps the split testable: the
//! session crate can be exercised against an in-memory fake transport in
//! tests without a live NATS server, and `rx-adapters` supplies the one real
//! implementation.
//!
//! Traits here use `async_trait` (rather than the native
//! return-position-`impl Trait` style some adapter crates use) because
//! `Session` holds transport handles as trait objects (`Arc<dyn Transport>`,
//! `Box<dyn PushSubscription>`) and native RPITIT methods are not
//! object-safe.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rx_domain::{ClientId, RtError};

/// A raw, already-decoded-from-envelope-wrapper message observed on the
/// wire: the concrete subject it arrived on and its raw payload bytes.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

/// Transport-level signal fed to the session's lifecycle dispatcher.
///
/// Distinct from [`rx_domain::LifecycleEvent`]: this is the raw vocabulary
/// the transport speaks (one variant per `async-nats` connection callback);
/// the session translates it into the richer, phase-carrying public event.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    ReconnectAttempt,
    Reconnected,
    ReconnectFailed,
    Error(String),
}

pub type LifecycleCallback = std::sync::Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Consumer configuration for a core-variant (push) subscription.
#[derive(Debug, Clone)]
pub struct PushConsumerSpec {
    pub name: String,
    pub filter_subjects: Vec<String>,
}

/// Consumer configuration for a queue-variant (pull) subscription.
#[derive(Debug, Clone)]
pub struct PullConsumerSpec {
    pub durable_name: String,
    pub deliver_group: String,
    pub filter_subject: String,
    pub ack_wait: Option<Duration>,
    pub backoff: Vec<Duration>,
    pub max_deliver: Option<i64>,
    pub max_ack_pending: Option<i64>,
}

/// A live push subscription. `recv` yields messages already acked by the
/// adapter — the ack precedes user-callback invocation so a slow or
/// failing handler never blocks redelivery; `None` means the subscription
/// has been torn down.
#[async_trait]
pub trait PushSubscription: Send + Sync {
    async fn recv(&mut self) -> Option<RawMessage>;
}

/// A message fetched from a pull consumer, carrying the ack handle the
/// application drives explicitly.
#[async_trait]
pub trait PullMessage: Send + Sync {
    fn subject(&self) -> &str;
    fn payload(&self) -> &[u8];
    async fn ack(&self) -> Result<(), RtError>;
    async fn nak(&self) -> Result<(), RtError>;
    async fn term(&self) -> Result<(), RtError>;
}

/// A durable pull consumer, polled one message at a time.
#[async_trait]
pub trait PullConsumer: Send + Sync {
    async fn fetch_one(&self, timeout: Duration) -> Result<Option<Box<dyn PullMessage>>, RtError>;
}

/// Everything the session needs from the message bus.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection, registering `on_event` to receive every
    /// subsequent transport-level state transition.
    async fn connect(&self, on_event: LifecycleCallback) -> Result<(), RtError>;

    /// The opaque id the transport assigned this session, once connected.
    fn client_id(&self) -> Option<ClientId>;

    /// Request/reply on an administrative subject.
    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, RtError>;

    /// Publish and wait for the server ack.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), RtError>;

    /// Current subject set of a stream, or `None` if it does not exist.
    async fn stream_subjects(&self, stream: &str) -> Result<Option<Vec<String>>, RtError>;

    async fn create_stream(&self, stream: &str, subjects: Vec<String>) -> Result<(), RtError>;

    async fn update_stream(&self, stream: &str, subjects: Vec<String>) -> Result<(), RtError>;

    async fn add_push_consumer(
        &self,
        stream: &str,
        spec: PushConsumerSpec,
    ) -> Result<Box<dyn PushSubscription>, RtError>;

    async fn add_pull_consumer(
        &self,
        stream: &str,
        spec: PullConsumerSpec,
    ) -> Result<std::sync::Arc<dyn PullConsumer>, RtError>;

    async fn delete_consumer(&self, stream: &str, name: &str) -> Result<bool, RtError>;

    /// Time-windowed read of a stream's subject.
    async fn history(
        &self,
        stream: &str,
        subject: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawMessage>, RtError>;

    async fn close(&self) -> Result<(), RtError>;
}
