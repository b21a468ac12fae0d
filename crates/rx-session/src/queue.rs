//! Queue extension: a durable,
//! group-scoped pull consumer with application-driven ack, layered over the
//! same [`rx_ports::Transport`] the core session uses but against its own
//! resolved namespace/hash and its own `Q_{namespace}` stream.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, instrument, warn};

use rx_domain::{ClientId, ConnectionState, Envelope, ResendReport, RtError};
use rx_ports::{PullConsumer, PullConsumerSpec, PullMessage, Transport};
use rx_subject::{is_valid_for_publish, is_valid_for_subscription, matches, presence_variant, strip_hash, wire_topic};

use crate::buffer::OfflineBuffer;
use crate::publisher::{self, Encoding};
use crate::registration::RegistrationTable;
use crate::stream;

/// A message fetched from a queue's durable pull consumer. The application
/// drives acknowledgment explicitly — nothing here auto-acks.
#[derive(Clone)]
pub struct QueueMessage {
    pub id: String,
    pub topic: String,
    pub message: Value,
    ack_handle: Arc<dyn PullMessage>,
}

impl QueueMessage {
    pub async fn ack(&self) -> Result<(), RtError> {
        self.ack_handle.ack().await
    }

    pub async fn nak(&self) -> Result<(), RtError> {
        self.ack_handle.nak().await
    }

    pub async fn term(&self) -> Result<(), RtError> {
        self.ack_handle.term().await
    }
}

impl std::fmt::Debug for QueueMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueMessage").field("id", &self.id).field("topic", &self.topic).finish()
    }
}

type SyncFn = Arc<dyn Fn(QueueMessage) + Send + Sync>;
type AsyncFn = Arc<dyn Fn(QueueMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// Queue-extension counterpart of [`rx_domain::Handler`]: same sync/async
/// split, parameterized over [`QueueMessage`] since the application owns
/// acknowledgment instead of the consumer loop acking on its behalf.
#[derive(Clone)]
pub enum QueueHandler {
    Sync(SyncFn),
    Async(AsyncFn),
}

impl QueueHandler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(QueueMessage) + Send + Sync + 'static,
    {
        QueueHandler::Sync(Arc::new(f))
    }

    pub fn async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(QueueMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        QueueHandler::Async(Arc::new(move |m| Box::pin(f(m))))
    }
}

/// Runs `handler` against `message` to completion and reports whether it
/// panicked, so the caller can `nak` — unlike the core variant's dispatcher,
/// the pull loop processes one message at a time and needs the outcome
/// before fetching the next.
async fn run_handler(handler: QueueHandler, message: QueueMessage) -> Result<(), ()> {
    match handler {
        QueueHandler::Sync(f) => tokio::task::spawn_blocking(move || {
            std::panic::catch_unwind(AssertUnwindSafe(|| f(message))).map_err(|_| ())
        })
        .await
        .unwrap_or(Err(())),
        QueueHandler::Async(f) => AssertUnwindSafe(f(message)).catch_unwind().await.map_err(|_| ()),
    }
}

/// Consumer configuration passed to [`Queue::consume`].
#[derive(Debug, Clone)]
pub struct ConsumeConfig {
    pub name: String,
    pub group: String,
    pub topic: String,
    pub ack_wait: Option<Duration>,
    pub backoff: Vec<Duration>,
    pub max_deliver: Option<i64>,
    pub max_ack_pending: Option<i64>,
}

impl ConsumeConfig {
    pub fn new(name: impl Into<String>, group: impl Into<String>, topic: impl Into<String>) -> Self {
        ConsumeConfig {
            name: name.into(),
            group: group.into(),
            topic: topic.into(),
            ack_wait: None,
            backoff: Vec::new(),
            max_deliver: None,
            max_ack_pending: None,
        }
    }
}

struct QueueCore {
    transport: Arc<dyn Transport>,
    queue_id: String,
    hash: String,
    stream_name: String,
    max_retries: u32,
    connected: Arc<RwLock<ConnectionState>>,
    registrations: RwLock<RegistrationTable<(ConsumeConfig, QueueHandler)>>,
    known_topics: RwLock<HashSet<String>>,
    buffer: Mutex<OfflineBuffer>,
}

impl QueueCore {
    async fn wire_subjects(&self) -> Vec<String> {
        let topics = self.known_topics.read().await;
        let mut subjects = Vec::new();
        for t in topics.iter() {
            let wire = wire_topic(&self.hash, t);
            subjects.push(presence_variant(&wire));
            subjects.push(wire);
        }
        subjects
    }

    async fn reconcile_stream(&self) -> Result<(), RtError> {
        let subjects = self.wire_subjects().await;
        stream::reconcile(self.transport.as_ref(), &self.stream_name, &subjects, self.max_retries).await
    }
}

/// A durable, group-scoped work queue layered over a session's namespace.
/// Cheap to clone — every clone shares the same registrations, buffer, and
/// stream.
#[derive(Clone)]
pub struct Queue {
    core: Arc<QueueCore>,
}

impl Queue {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        queue_id: String,
        hash: String,
        stream_name: String,
        max_retries: u32,
        connected: Arc<RwLock<ConnectionState>>,
    ) -> Self {
        Queue {
            core: Arc::new(QueueCore {
                transport,
                queue_id,
                hash,
                stream_name,
                max_retries,
                connected,
                registrations: RwLock::new(RegistrationTable::default()),
                known_topics: RwLock::new(HashSet::new()),
                buffer: Mutex::new(OfflineBuffer::default()),
            }),
        }
    }

    pub fn queue_id(&self) -> &str {
        &self.core.queue_id
    }

    /// Subscribes `handler` to `cfg.topic` (which may carry `*`/`>`
    /// wildcards) via a durable, group-scoped pull consumer. Returns `false`
    /// without disturbing the existing subscription if the topic is already
    /// registered.
    #[instrument(skip(self, handler), fields(topic = %cfg.topic, name = %cfg.name))]
    pub async fn consume(&self, cfg: ConsumeConfig, handler: QueueHandler) -> Result<bool, RtError> {
        if cfg.name.is_empty() {
            return Err(RtError::config("consumer name must not be empty"));
        }
        if !is_valid_for_subscription(&cfg.topic) {
            return Err(RtError::config(format!("'{}' is not a valid topic", cfg.topic)));
        }

        let inserted = {
            let mut table = self.core.registrations.write().await;
            table.insert(cfg.topic.clone(), (cfg.clone(), handler))
        };
        if !inserted {
            return Ok(false);
        }

        self.core.known_topics.write().await.insert(cfg.topic.clone());
        self.core.reconcile_stream().await?;

        let client_id = self.core.transport.client_id();
        let cancel = Arc::new(Notify::new());
        self.core.registrations.write().await.set_cancel(&cfg.topic, cancel.clone());
        tokio::spawn(run_pull_loop(self.core.clone(), cfg, client_id, cancel));

        Ok(true)
    }

    /// Drops the registration row for `topic`; the running fetch loop (if
    /// any) exits on its next tick once it observes the row is gone.
    pub async fn detach_consumer(&self, topic: &str) -> bool {
        self.core.registrations.write().await.remove(topic).is_some()
    }

    /// As [`Queue::detach_consumer`], and additionally asks the server to
    /// delete the durable consumer named `name`.
    pub async fn delete_consumer(&self, name: &str) -> Result<bool, RtError> {
        self.core.transport.delete_consumer(&self.core.stream_name, name).await
    }

    #[instrument(skip(self, data))]
    pub async fn publish(&self, topic: &str, data: Value) -> Result<bool, RtError> {
        if topic.is_empty() {
            return Err(RtError::config("topic must not be empty"));
        }
        if !is_valid_for_publish(topic) {
            return Err(RtError::config(format!("'{topic}' is not a valid publish target")));
        }
        if data.is_null() {
            return Err(RtError::config("data must not be null"));
        }

        if !self.core.connected.read().await.is_connected() {
            self.core.buffer.lock().await.push(topic.to_string(), data);
            return Ok(false);
        }

        let is_new = self.core.known_topics.write().await.insert(topic.to_string());
        if is_new {
            self.core.reconcile_stream().await?;
        }

        let wire_subject = wire_topic(&self.core.hash, topic);
        let client_id = self
            .core
            .transport
            .client_id()
            .ok_or_else(|| RtError::transport("client id not resolved"))?;

        publisher::publish(self.core.transport.as_ref(), &wire_subject, &client_id, topic, data, Encoding::MsgPack).await
    }

    /// Stops every running fetch loop so reconnect can't spawn a duplicate
    /// alongside one still polling the pre-disconnect consumer.
    pub(crate) async fn on_disconnected(&self) {
        self.core.registrations.write().await.clear_cancel_handles();
    }

    pub(crate) async fn on_reconnected(&self) -> Vec<ResendReport> {
        if let Err(e) = self.core.reconcile_stream().await {
            warn!(error = %e, queue_id = %self.core.queue_id, "queue stream reconcile failed on reconnect");
        }

        let topics: Vec<ConsumeConfig> = {
            let table = self.core.registrations.read().await;
            table.topics().filter_map(|t| table.handler(t).map(|(cfg, _)| cfg)).collect()
        };
        let client_id = self.core.transport.client_id();
        for cfg in topics {
            let cancel = Arc::new(Notify::new());
            self.core.registrations.write().await.set_cancel(&cfg.topic, cancel.clone());
            tokio::spawn(run_pull_loop(self.core.clone(), cfg, client_id.clone(), cancel));
        }

        let entries = self.core.buffer.lock().await.drain();
        let mut reports = Vec::with_capacity(entries.len());
        for entry in entries {
            let resent = self.publish(&entry.topic, entry.message.clone()).await.unwrap_or(false);
            reports.push(ResendReport { topic: entry.topic, message: entry.message, resent });
        }
        reports
    }

    pub(crate) async fn on_reconnect_failed(&self) {
        self.core.buffer.lock().await.clear();
    }
}

async fn run_pull_loop(core: Arc<QueueCore>, cfg: ConsumeConfig, client_id: Option<ClientId>, cancel: Arc<Notify>) {
    let spec = PullConsumerSpec {
        durable_name: cfg.name.clone(),
        deliver_group: cfg.group.clone(),
        filter_subject: wire_topic(&core.hash, &cfg.topic),
        ack_wait: cfg.ack_wait,
        backoff: cfg.backoff.clone(),
        max_deliver: cfg.max_deliver,
        max_ack_pending: cfg.max_ack_pending,
    };

    let consumer = match core.transport.add_pull_consumer(&core.stream_name, spec).await {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, name = %cfg.name, "failed to create pull consumer");
            return;
        }
    };

    loop {
        if !core.registrations.read().await.contains(&cfg.topic) {
            break;
        }

        let fetched = tokio::select! {
            _ = cancel.notified() => break,
            res = consumer.fetch_one(Duration::from_secs(1)) => res,
        };

        let fetched = match fetched {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, name = %cfg.name, "pull fetch error");
                continue;
            }
        };

        let Some(msg) = fetched else { continue };
        handle_one(&core, &cfg, &client_id, msg).await;
    }
}

async fn handle_one(core: &Arc<QueueCore>, cfg: &ConsumeConfig, client_id: &Option<ClientId>, msg: Box<dyn PullMessage>) {
    let subject = msg.subject().to_string();
    let payload = msg.payload().to_vec();

    let envelope = match Envelope::decode_msgpack(&payload) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, subject, "dropping undecodable queue message");
            let _ = msg.nak().await;
            return;
        }
    };

    if client_id.as_ref().map(|id| id.0.as_str()) == Some(envelope.client_id.as_str()) {
        let _ = msg.ack().await;
        return;
    }

    let concrete = strip_hash(&subject, &core.hash).to_string();
    if !matches(&cfg.topic, &concrete) {
        let _ = msg.nak().await;
        return;
    }

    let handler = { core.registrations.read().await.handler(&cfg.topic).map(|(_, h)| h) };
    let Some(handler) = handler else {
        let _ = msg.nak().await;
        return;
    };

    let qmsg = QueueMessage {
        id: envelope.id.to_string(),
        topic: concrete,
        message: envelope.message,
        ack_handle: Arc::from(msg),
    };

    if run_handler(handler, qmsg.clone()).await.is_err() {
        debug!(topic = %cfg.topic, "queue handler failed, nak'ing");
        let _ = qmsg.nak().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rx_ports::{LifecycleCallback, PushConsumerSpec, PushSubscription, RawMessage};
    use tokio::sync::mpsc;

    use super::*;

    #[derive(Default)]
    struct AckTracker {
        acked: AtomicUsize,
        naked: AtomicUsize,
    }

    struct FakePullMessage {
        subject: String,
        payload: Vec<u8>,
        tracker: Arc<AckTracker>,
    }

    #[async_trait]
    impl PullMessage for FakePullMessage {
        fn subject(&self) -> &str {
            &self.subject
        }

        fn payload(&self) -> &[u8] {
            &self.payload
        }

        async fn ack(&self) -> Result<(), RtError> {
            self.tracker.acked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn nak(&self) -> Result<(), RtError> {
            self.tracker.naked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn term(&self) -> Result<(), RtError> {
            Ok(())
        }
    }

    struct FakePullConsumer {
        rx: Mutex<mpsc::UnboundedReceiver<(String, Vec<u8>)>>,
        tracker: Arc<AckTracker>,
    }

    #[async_trait]
    impl PullConsumer for FakePullConsumer {
        async fn fetch_one(&self, timeout: Duration) -> Result<Option<Box<dyn PullMessage>>, RtError> {
            let mut rx = self.rx.lock().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some((subject, payload))) => {
                    Ok(Some(Box::new(FakePullMessage { subject, payload, tracker: self.tracker.clone() })))
                }
                _ => Ok(None),
            }
        }
    }

    /// Fake transport exposing only what the queue extension's pull loop
    /// drives: `add_pull_consumer` and, through it, ack/nak bookkeeping.
    struct FakeTransport {
        client_id: ClientId,
        tx: StdMutex<Option<mpsc::UnboundedSender<(String, Vec<u8>)>>>,
        tracker: Arc<AckTracker>,
    }

    impl FakeTransport {
        fn new() -> Self {
            FakeTransport {
                client_id: ClientId("c1".to_string()),
                tx: StdMutex::new(None),
                tracker: Arc::new(AckTracker::default()),
            }
        }

        fn deliver(&self, subject: &str, payload: Vec<u8>) {
            if let Some(tx) = self.tx.lock().unwrap().as_ref() {
                let _ = tx.send((subject.to_string(), payload));
            }
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(&self, _on_event: LifecycleCallback) -> Result<(), RtError> {
            Ok(())
        }

        fn client_id(&self) -> Option<ClientId> {
            Some(self.client_id.clone())
        }

        async fn request(&self, _subject: &str, _payload: Vec<u8>, _timeout: Duration) -> Result<Vec<u8>, RtError> {
            Err(RtError::transport("not used by queue tests"))
        }

        async fn publish(&self, _subject: &str, _payload: Vec<u8>) -> Result<(), RtError> {
            Ok(())
        }

        async fn stream_subjects(&self, _stream: &str) -> Result<Option<Vec<String>>, RtError> {
            Ok(None)
        }

        async fn create_stream(&self, _stream: &str, _subjects: Vec<String>) -> Result<(), RtError> {
            Ok(())
        }

        async fn update_stream(&self, _stream: &str, _subjects: Vec<String>) -> Result<(), RtError> {
            Ok(())
        }

        async fn add_push_consumer(
            &self,
            _stream: &str,
            _spec: PushConsumerSpec,
        ) -> Result<Box<dyn PushSubscription>, RtError> {
            Err(RtError::transport("push consumers not used by queue tests"))
        }

        async fn add_pull_consumer(
            &self,
            _stream: &str,
            _spec: PullConsumerSpec,
        ) -> Result<Arc<dyn PullConsumer>, RtError> {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.tx.lock().unwrap() = Some(tx);
            Ok(Arc::new(FakePullConsumer { rx: Mutex::new(rx), tracker: self.tracker.clone() }))
        }

        async fn delete_consumer(&self, _stream: &str, _name: &str) -> Result<bool, RtError> {
            Ok(true)
        }

        async fn history(
            &self,
            _stream: &str,
            _subject: &str,
            _start: DateTime<Utc>,
            _end: Option<DateTime<Utc>>,
        ) -> Result<Vec<RawMessage>, RtError> {
            Ok(Vec::new())
        }

        async fn close(&self) -> Result<(), RtError> {
            Ok(())
        }
    }

    fn test_queue(transport: Arc<FakeTransport>) -> Queue {
        Queue::new(
            transport,
            "q1".to_string(),
            "h1".to_string(),
            "Q_ns1".to_string(),
            3,
            Arc::new(RwLock::new(ConnectionState::Connected)),
        )
    }

    #[tokio::test]
    async fn consume_is_idempotent_per_topic() {
        let queue = test_queue(Arc::new(FakeTransport::new()));
        let cfg = ConsumeConfig::new("w1", "g", "q.>");

        assert!(queue.consume(cfg.clone(), QueueHandler::sync(|_| {})).await.unwrap());
        assert!(!queue.consume(cfg, QueueHandler::sync(|_| {})).await.unwrap());
    }

    #[tokio::test]
    async fn consume_rejects_invalid_config() {
        let queue = test_queue(Arc::new(FakeTransport::new()));

        assert!(queue.consume(ConsumeConfig::new("", "g", "q.>"), QueueHandler::sync(|_| {})).await.is_err());
        assert!(queue.consume(ConsumeConfig::new("w1", "g", "q b"), QueueHandler::sync(|_| {})).await.is_err());
    }

    #[tokio::test]
    async fn detach_consumer_removes_registration_once() {
        let queue = test_queue(Arc::new(FakeTransport::new()));
        queue.consume(ConsumeConfig::new("w1", "g", "q.>"), QueueHandler::sync(|_| {})).await.unwrap();

        assert!(queue.detach_consumer("q.>").await);
        assert!(!queue.detach_consumer("q.>").await);
    }

    /// A message the handler processes successfully is
    /// acked; one that makes the handler panic is nak'd instead, and both
    /// skip messages that don't match the registered pattern.
    #[tokio::test]
    async fn handler_outcome_drives_ack_or_nak() {
        let transport = Arc::new(FakeTransport::new());
        let tracker = transport.tracker.clone();
        let queue = test_queue(transport.clone());

        let seen: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        queue
            .consume(
                ConsumeConfig::new("w1", "g", "q.>"),
                QueueHandler::sync(move |m: QueueMessage| {
                    if m.topic == "q.fail" {
                        panic!("simulated handler failure");
                    }
                    seen_clone.lock().unwrap().push(m.topic.clone());
                }),
            )
            .await
            .unwrap();

        // Let the pull loop finish creating its consumer before delivering.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let ok = Envelope::new("someone-else", "q.ok", serde_json::json!({ "n": 1 }));
        transport.deliver("h1.q.ok", ok.encode_msgpack().unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.acked.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().unwrap().as_slice(), ["q.ok".to_string()]);

        let bad = Envelope::new("someone-else", "q.fail", serde_json::json!({ "n": 2 }));
        transport.deliver("h1.q.fail", bad.encode_msgpack().unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.naked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loopback_queue_messages_are_acked_without_reaching_the_handler() {
        let transport = Arc::new(FakeTransport::new());
        let tracker = transport.tracker.clone();
        let queue = test_queue(transport.clone());

        let seen: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        queue
            .consume(
                ConsumeConfig::new("w1", "g", "q.>"),
                QueueHandler::sync(move |m: QueueMessage| seen_clone.lock().unwrap().push(m.topic.clone())),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let looped_back = Envelope::new("c1", "q.ok", serde_json::json!({ "n": 1 }));
        transport.deliver("h1.q.ok", looped_back.encode_msgpack().unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(tracker.acked.load(Ordering::SeqCst), 1);
    }
}
