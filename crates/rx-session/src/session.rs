//! The session and subscription manager — the crate's entry point. Ties the
//! stream reconciler, consumer registry, offline buffer, and diagnostics
//! into the public `on`/`off`/`publish`/`history`/`connect`/`close`/
//! `init_queue` surface.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{info, instrument, warn};

use rx_adapters::{materialize_creds, resolve_namespace, resolve_queue_namespace, Endpoints, NatsTransport};
use rx_domain::{
    ConnectionState, Envelope, Handler, LifecycleEvent, Phase, ResendReport, RtError, CONNECTED, DISCONNECTED,
};
use rx_ports::{Transport, TransportEvent};
use rx_subject::{is_valid_for_publish, is_valid_for_subscription, presence_variant, wire_topic};

use crate::buffer::OfflineBuffer;
use crate::config::{Config, InitOpts};
use crate::consumers;
use crate::dispatch;
use crate::history;
use crate::publisher::{self, Encoding};
use crate::queue::Queue;
use crate::registration::RegistrationTable;
use crate::stream;

struct SessionCore {
    config: Config,
    opts: InitOpts,
    transport: Arc<dyn Transport>,
    // Keeps the creds temp file alive for the session's lifetime; never read
    // after construction.
    _creds_file: tempfile::NamedTempFile,
    namespace: RwLock<Option<String>>,
    hash: RwLock<Option<String>>,
    stream_name: RwLock<Option<String>>,
    state: Arc<RwLock<ConnectionState>>,
    manual_disconnect: AtomicBool,
    registrations: Arc<RwLock<RegistrationTable<Handler>>>,
    known_topics: RwLock<HashSet<String>>,
    buffer: Mutex<OfflineBuffer>,
    queues: RwLock<Vec<Queue>>,
}

/// A session against one configured credential pair — owns the transport,
/// the registration table, the offline buffer, and any [`Queue`]s created
/// off it. One instance per credential pair; no shared global state.
#[derive(Clone)]
pub struct Session {
    core: Arc<SessionCore>,
}

impl Session {
    /// Materializes credentials and builds the transport; does not connect
    /// (see [`Session::connect`]).
    pub fn new(config: Config, opts: InitOpts) -> Result<Self, RtError> {
        let creds_file = materialize_creds(&config.api_key, &config.secret)?;
        let transport = Arc::new(NatsTransport::new(opts.endpoints(), config.api_key.clone(), creds_file.path()));
        Ok(Session::from_parts(config, opts, transport, creds_file))
    }

    /// Builds a session directly over a caller-supplied transport, bypassing
    /// credential materialization and the `NatsTransport`. Used by this
    /// crate's own tests to exercise the session/subscription manager
    /// against an in-memory fake rather than a live NATS server.
    #[cfg(test)]
    pub(crate) fn new_for_test(config: Config, opts: InitOpts, transport: Arc<dyn Transport>) -> Self {
        let creds_file = tempfile::NamedTempFile::new().expect("creating scratch creds file for test");
        Session::from_parts(config, opts, transport, creds_file)
    }

    fn from_parts(
        config: Config,
        opts: InitOpts,
        transport: Arc<dyn Transport>,
        creds_file: tempfile::NamedTempFile,
    ) -> Self {
        Session {
            core: Arc::new(SessionCore {
                config,
                opts,
                transport,
                _creds_file: creds_file,
                namespace: RwLock::new(None),
                hash: RwLock::new(None),
                stream_name: RwLock::new(None),
                state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
                manual_disconnect: AtomicBool::new(false),
                registrations: Arc::new(RwLock::new(RegistrationTable::default())),
                known_topics: RwLock::new(HashSet::new()),
                buffer: Mutex::new(OfflineBuffer::default()),
                queues: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Connects to the transport, resolves the tenant namespace, reconciles
    /// the session's stream, and re-creates consumers for every topic
    /// already registered via `on`. Returns once the first connect sequence
    /// has completed; subsequent reconnects are handled in the background.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<(), RtError> {
        *self.core.state.write().await = ConnectionState::Connecting;

        let (tx, mut rx) = mpsc::unbounded_channel::<TransportEvent>();
        let background = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                background.handle_transport_event(event).await;
            }
        });

        let on_event: rx_ports::LifecycleCallback = Arc::new(move |event| {
            let _ = tx.send(event);
        });

        self.core.transport.connect(on_event).await?;
        self.on_first_connected().await?;
        Ok(())
    }

    async fn on_first_connected(&self) -> Result<(), RtError> {
        let namespace = resolve_namespace(self.core.transport.as_ref(), &self.core.config.api_key).await?;
        let stream_name = format!("{namespace}_stream");

        *self.core.hash.write().await = Some(namespace.clone());
        *self.core.stream_name.write().await = Some(stream_name);
        *self.core.namespace.write().await = Some(namespace);
        *self.core.state.write().await = ConnectionState::Connected;

        self.reconcile_stream().await?;

        let topics: Vec<String> = {
            let table = self.core.registrations.read().await;
            table.topics().filter(|t| !rx_domain::is_reserved_lifecycle_name(t)).cloned().collect()
        };
        for topic in topics {
            if let Err(e) = self.subscribe_topic(&topic).await {
                warn!(error = %e, topic, "failed to start consumer on connect");
            }
        }

        info!("session connected");
        self.fire_lifecycle(LifecycleEvent::Connected).await;
        Ok(())
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            // The first `Connected` is awaited inline by `connect()`;
            // everything after is a genuine reconnect.
            TransportEvent::Connected => {}
            TransportEvent::Disconnected => self.on_disconnected().await,
            TransportEvent::ReconnectAttempt => {
                if !self.core.manual_disconnect.load(Ordering::SeqCst) {
                    self.fire_lifecycle(LifecycleEvent::Reconnect(Phase::Reconnecting)).await;
                }
            }
            TransportEvent::Reconnected => self.on_reconnected().await,
            TransportEvent::ReconnectFailed => self.on_reconnect_failed().await,
            TransportEvent::Error(reason) => warn!(reason, "transport error"),
        }
    }

    async fn on_disconnected(&self) {
        *self.core.state.write().await = ConnectionState::Disconnected;
        self.core.registrations.write().await.clear_cancel_handles();
        for queue in self.core.queues.read().await.iter() {
            queue.on_disconnected().await;
        }
        self.fire_lifecycle(LifecycleEvent::Disconnected).await;
    }

    async fn on_reconnected(&self) {
        *self.core.state.write().await = ConnectionState::Connected;
        self.fire_lifecycle(LifecycleEvent::Reconnect(Phase::Reconnected)).await;

        if let Err(e) = self.reconcile_stream().await {
            warn!(error = %e, "stream reconcile failed on reconnect");
        }

        let topics: Vec<String> = {
            let table = self.core.registrations.read().await;
            table.topics().filter(|t| !rx_domain::is_reserved_lifecycle_name(t)).cloned().collect()
        };
        for topic in topics {
            if let Err(e) = self.subscribe_topic(&topic).await {
                warn!(error = %e, topic, "failed to recreate consumer on reconnect");
            }
        }

        let mut reports: Vec<ResendReport> = self.drain_and_replay().await;

        for queue in self.core.queues.read().await.iter() {
            reports.extend(queue.on_reconnected().await);
        }

        if !reports.is_empty() {
            self.fire_lifecycle(LifecycleEvent::MessageResend(reports)).await;
        }
    }

    async fn on_reconnect_failed(&self) {
        self.fire_lifecycle(LifecycleEvent::Reconnect(Phase::ReconnFail)).await;
        self.core.buffer.lock().await.clear();
        for queue in self.core.queues.read().await.iter() {
            queue.on_reconnect_failed().await;
        }
    }

    async fn drain_and_replay(&self) -> Vec<ResendReport> {
        let entries = self.core.buffer.lock().await.drain();
        let mut reports = Vec::with_capacity(entries.len());
        for entry in entries {
            let resent = self.publish(&entry.topic, entry.message.clone()).await.unwrap_or(false);
            reports.push(ResendReport { topic: entry.topic, message: entry.message, resent });
        }
        reports
    }

    async fn fire_lifecycle(&self, event: LifecycleEvent) {
        let topic = event.topic();
        let handler = { self.core.registrations.read().await.handler(topic) };
        let Some(handler) = handler else { return };

        let payload = match &event {
            LifecycleEvent::Connected | LifecycleEvent::Disconnected => Value::Null,
            LifecycleEvent::Reconnect(phase) => Value::String(phase.as_str().to_string()),
            LifecycleEvent::MessageResend(reports) => serde_json::to_value(reports).unwrap_or(Value::Null),
        };
        dispatch::invoke(handler, payload);
    }

    async fn wire_subjects(&self) -> Result<Vec<String>, RtError> {
        let hash = self.core.hash.read().await.clone().ok_or_else(|| RtError::transport("not connected"))?;

        let mut topics: HashSet<String> = self.core.known_topics.read().await.clone();
        for t in self.core.registrations.read().await.topics() {
            if !rx_domain::is_reserved_lifecycle_name(t) {
                topics.insert(t.clone());
            }
        }

        let mut subjects = Vec::with_capacity(topics.len() * 2);
        for t in topics {
            let wire = wire_topic(&hash, &t);
            subjects.push(presence_variant(&wire));
            subjects.push(wire);
        }
        Ok(subjects)
    }

    async fn reconcile_stream(&self) -> Result<(), RtError> {
        let stream_name = self.core.stream_name.read().await.clone().ok_or_else(|| RtError::transport("not connected"))?;
        let subjects = self.wire_subjects().await?;
        stream::reconcile(self.core.transport.as_ref(), &stream_name, &subjects, self.core.opts.max_retries).await
    }

    async fn subscribe_topic(&self, topic: &str) -> Result<(), RtError> {
        self.reconcile_stream().await?;

        let hash = self.core.hash.read().await.clone().ok_or_else(|| RtError::transport("not connected"))?;
        let stream_name = self.core.stream_name.read().await.clone().ok_or_else(|| RtError::transport("not connected"))?;
        let wire_subject = wire_topic(&hash, topic);
        let client_id = self.core.transport.client_id();

        let cancel = consumers::spawn(
            self.core.transport.clone(),
            stream_name,
            topic.to_string(),
            wire_subject,
            client_id,
            self.core.registrations.clone(),
        )
        .await?;

        self.core.registrations.write().await.set_cancel(topic, cancel);
        Ok(())
    }

    /// Registers `handler` against `topic`. Reserved lifecycle names bypass
    /// subject validation and never get a wire consumer. Returns `false`
    /// without replacing the existing handler if `topic` is already
    /// registered.
    #[instrument(skip(self, handler))]
    pub async fn on(&self, topic: impl Into<String>, handler: Handler) -> Result<bool, RtError> {
        let topic = topic.into();
        let reserved = rx_domain::is_reserved_lifecycle_name(&topic);
        if !reserved && !is_valid_for_subscription(&topic) {
            return Err(RtError::config(format!("'{topic}' is not a valid topic")));
        }

        let inserted = self.core.registrations.write().await.insert(topic.clone(), handler);
        if !inserted {
            return Ok(false);
        }
        if reserved {
            return Ok(true);
        }

        self.core.known_topics.write().await.insert(topic.clone());

        if self.core.state.read().await.is_connected() {
            self.subscribe_topic(&topic).await?;
        }
        Ok(true)
    }

    /// Unregisters `topic`'s handler and stops its consumer loop. Returns
    /// `false` if `topic` was not registered.
    pub async fn off(&self, topic: &str) -> bool {
        match self.core.registrations.write().await.remove(topic) {
            Some(row) => {
                if let Some(cancel) = row.cancel {
                    cancel.notify_waiters();
                }
                true
            }
            None => false,
        }
    }

    /// Validates, envelopes, and publishes `data` to `topic`. While
    /// disconnected, buffers the publish and returns `Ok(false)`.
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

        if !self.core.state.read().await.is_connected() {
            self.core.buffer.lock().await.push(topic.to_string(), data);
            return Ok(false);
        }

        let is_new = self.core.known_topics.write().await.insert(topic.to_string());
        if is_new {
            self.reconcile_stream().await?;
        }

        let hash = self.core.hash.read().await.clone().ok_or_else(|| RtError::transport("not connected"))?;
        let wire_subject = wire_topic(&hash, topic);
        let client_id = self.core.transport.client_id().ok_or_else(|| RtError::transport("client id not resolved"))?;

        publisher::publish(self.core.transport.as_ref(), &wire_subject, &client_id, topic, data, Encoding::Json).await
    }

    /// Reads envelopes observed on `topic` between `start` and `end`
    /// (defaulting to now), via a time-windowed, ephemeral consumer.
    #[instrument(skip(self))]
    pub async fn history(
        &self,
        topic: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Envelope>, RtError> {
        if topic.is_empty() || !is_valid_for_publish(topic) {
            return Err(RtError::config(format!("'{topic}' is not a valid topic")));
        }

        let hash = self.core.hash.read().await.clone().ok_or_else(|| RtError::config("session is not connected"))?;
        let stream_name = self
            .core
            .stream_name
            .read()
            .await
            .clone()
            .ok_or_else(|| RtError::config("session is not connected"))?;
        let wire_subject = wire_topic(&hash, topic);

        history::read(self.core.transport.as_ref(), &stream_name, &wire_subject, start, end, Encoding::Json).await
    }

    /// Resolves a queue namespace for `queue_id` and returns a [`Queue`]
    /// attached to this session — its stream and lifecycle are reconciled
    /// alongside the session's own on every reconnect.
    #[instrument(skip(self))]
    pub async fn init_queue(&self, queue_id: impl Into<String>) -> Result<Queue, RtError> {
        let queue_id = queue_id.into();
        if queue_id.is_empty() {
            return Err(RtError::config("queue_id must not be empty"));
        }

        let (namespace, hash) =
            resolve_queue_namespace(self.core.transport.as_ref(), &self.core.config.api_key, &queue_id).await?;
        let stream_name = format!("Q_{namespace}");

        let queue = Queue::new(
            self.core.transport.clone(),
            queue_id,
            hash,
            stream_name,
            self.core.opts.max_retries,
            self.core.state.clone(),
        );

        self.core.queues.write().await.push(queue.clone());
        Ok(queue)
    }

    /// Marks the session manually closed, suppressing reconnection, and
    /// closes the transport.
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<(), RtError> {
        self.core.manual_disconnect.store(true, Ordering::SeqCst);
        *self.core.state.write().await = ConnectionState::Closed;
        self.core.registrations.write().await.clear_cancel_handles();
        self.core.transport.close().await
    }
}

/// Reserved event name re-exports, mirrored at the crate root for callers
/// who only need the constants.
pub use rx_domain::{MESSAGE_RESEND, RECONNECT};
pub const LIFECYCLE_CONNECTED: &str = CONNECTED;
pub const LIFECYCLE_DISCONNECTED: &str = DISCONNECTED;

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool as StdAtomicBool;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use rx_domain::{ClientId, MESSAGE_RESEND};
    use rx_ports::{LifecycleCallback, PullConsumer, PullConsumerSpec, PushConsumerSpec, PushSubscription, RawMessage};

    use super::*;

    /// In-memory stand-in for `NatsTransport`, driving `Session` through the
    /// same port every real adapter does: fakes over the port trait, never
    /// a live NATS server.
    struct FakeTransport {
        client_id: ClientId,
        namespace: String,
        published: StdMutex<Vec<(String, Vec<u8>)>>,
        publish_should_fail: StdAtomicBool,
        streams: StdMutex<HashMap<String, Vec<String>>>,
        push_channels: StdMutex<HashMap<String, mpsc::UnboundedSender<RawMessage>>>,
    }

    impl FakeTransport {
        fn new(client_id: &str, namespace: &str) -> Self {
            FakeTransport {
                client_id: ClientId(client_id.to_string()),
                namespace: namespace.to_string(),
                published: StdMutex::new(Vec::new()),
                publish_should_fail: StdAtomicBool::new(false),
                streams: StdMutex::new(HashMap::new()),
                push_channels: StdMutex::new(HashMap::new()),
            }
        }

        fn fail_next_publishes(&self) {
            self.publish_should_fail.store(true, Ordering::SeqCst);
        }

        fn let_publishes_through(&self) {
            self.publish_should_fail.store(false, Ordering::SeqCst);
        }

        fn published_topics(&self) -> Vec<String> {
            self.published.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
        }

        fn stream_subjects_of(&self, stream: &str) -> Vec<String> {
            self.streams.lock().unwrap().get(stream).cloned().unwrap_or_default()
        }

        /// Pushes a raw message to whatever push consumer was created with
        /// `wire_subject` as its primary filter subject, simulating a
        /// message arriving from the wire.
        fn deliver(&self, wire_subject: &str, msg: RawMessage) {
            if let Some(tx) = self.push_channels.lock().unwrap().get(wire_subject) {
                let _ = tx.send(msg);
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

        async fn request(&self, subject: &str, _payload: Vec<u8>, _timeout: Duration) -> Result<Vec<u8>, RtError> {
            match subject {
                "accounts.user.get_namespace" => Ok(serde_json::to_vec(&serde_json::json!({
                    "status": "NAMESPACE_RETRIEVE_SUCCESS",
                    "data": { "namespace": self.namespace },
                }))
                .unwrap()),
                other => Err(RtError::transport(format!("unexpected request subject {other}"))),
            }
        }

        async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), RtError> {
            if self.publish_should_fail.load(Ordering::SeqCst) {
                return Err(RtError::transport("publish rejected by fake transport"));
            }
            self.published.lock().unwrap().push((subject.to_string(), payload));
            Ok(())
        }

        async fn stream_subjects(&self, stream: &str) -> Result<Option<Vec<String>>, RtError> {
            Ok(self.streams.lock().unwrap().get(stream).cloned())
        }

        async fn create_stream(&self, stream: &str, subjects: Vec<String>) -> Result<(), RtError> {
            self.streams.lock().unwrap().insert(stream.to_string(), subjects);
            Ok(())
        }

        async fn update_stream(&self, stream: &str, subjects: Vec<String>) -> Result<(), RtError> {
            self.streams.lock().unwrap().insert(stream.to_string(), subjects);
            Ok(())
        }

        async fn add_push_consumer(
            &self,
            _stream: &str,
            spec: PushConsumerSpec,
        ) -> Result<Box<dyn PushSubscription>, RtError> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.push_channels.lock().unwrap().insert(spec.filter_subjects[0].clone(), tx);
            Ok(Box::new(FakePushSubscription { rx }))
        }

        async fn add_pull_consumer(
            &self,
            _stream: &str,
            _spec: PullConsumerSpec,
        ) -> Result<Arc<dyn PullConsumer>, RtError> {
            Err(RtError::transport("fake transport has no pull consumers"))
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

    struct FakePushSubscription {
        rx: mpsc::UnboundedReceiver<RawMessage>,
    }

    #[async_trait]
    impl PushSubscription for FakePushSubscription {
        async fn recv(&mut self) -> Option<RawMessage> {
            self.rx.recv().await
        }
    }

    fn test_config() -> Config {
        Config::new("test-api-key", "test-secret").unwrap()
    }

    async fn connected_session(transport: Arc<FakeTransport>) -> Session {
        let session = Session::new_for_test(test_config(), InitOpts::default(), transport);
        session.connect().await.unwrap();
        session
    }

    #[tokio::test]
    async fn on_is_idempotent_and_off_reports_unknown_topics() {
        let transport = Arc::new(FakeTransport::new("c1", "ns1"));
        let session = Session::new_for_test(test_config(), InitOpts::default(), transport);

        assert!(session.on("orders", Handler::sync(|_| {})).await.unwrap());
        assert!(!session.on("orders", Handler::sync(|_| {})).await.unwrap());

        assert!(session.off("orders").await);
        assert!(!session.off("orders").await);
        assert!(!session.off("never-registered").await);
    }

    #[tokio::test]
    async fn publish_rejects_invalid_arguments() {
        let transport = Arc::new(FakeTransport::new("c1", "ns1"));
        let session = Session::new_for_test(test_config(), InitOpts::default(), transport);

        assert!(session.publish("", serde_json::json!(1)).await.is_err());
        assert!(session.publish("a.*", serde_json::json!(1)).await.is_err());
        assert!(session.publish("a.b", serde_json::Value::Null).await.is_err());
    }

    #[tokio::test]
    async fn offline_publishes_are_buffered_and_replayed_in_order_on_reconnect() {
        let transport = Arc::new(FakeTransport::new("c1", "ns1"));
        let session = Session::new_for_test(test_config(), InitOpts::default(), transport.clone());

        // Three publishes issued while disconnected each return `false` and
        // are queued, in order.
        for n in 1..=3 {
            assert_eq!(session.publish("orders", serde_json::json!({ "n": n })).await.unwrap(), false);
        }

        let received: Arc<StdMutex<Vec<serde_json::Value>>> = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();
        session
            .on(MESSAGE_RESEND, Handler::sync(move |payload| {
                received_clone.lock().unwrap().push(payload);
            }))
            .await
            .unwrap();

        // Bring the session up, which resolves the namespace and reconciles
        // the (still-empty) stream, then fire a reconnect directly.
        session.connect().await.unwrap();
        session.on_reconnected().await;

        // Dispatch runs the MESSAGE_RESEND handler on the blocking pool;
        // give it a beat to land before asserting.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let reports = received.lock().unwrap().clone();
        assert_eq!(reports.len(), 1);
        let list = reports[0].as_array().unwrap();
        assert_eq!(list.len(), 3);
        for (i, report) in list.iter().enumerate() {
            assert_eq!(report["topic"], "orders");
            assert_eq!(report["message"]["n"], i as i64 + 1);
            assert_eq!(report["resent"], true);
        }
    }

    #[tokio::test]
    async fn reconnect_fail_clears_the_offline_buffer_without_replay() {
        let transport = Arc::new(FakeTransport::new("c1", "ns1"));
        let session = Session::new_for_test(test_config(), InitOpts::default(), transport);

        session.publish("orders", serde_json::json!({ "n": 1 })).await.unwrap();
        session.on_reconnect_failed().await;

        // The buffer was cleared, so a subsequent reconnect replays nothing.
        session.on_reconnected().await;
        assert!(session.core.buffer.lock().await.drain().is_empty());
    }

    #[tokio::test]
    async fn reconnect_reconciles_stream_and_recreates_consumers() {
        let transport = Arc::new(FakeTransport::new("c1", "ns1"));
        let session = connected_session(transport.clone()).await;

        session.on("a", Handler::sync(|_| {})).await.unwrap();

        let stream_name = "ns1_stream";
        assert!(transport.stream_subjects_of(stream_name).contains(&"ns1.a".to_string()));
        assert!(transport.stream_subjects_of(stream_name).contains(&"ns1.a_presence".to_string()));

        // Simulate a disconnect/reconnect cycle; the consumer for "a" must
        // be re-created against the same wire subject.
        session.on_disconnected().await;
        session.on_reconnected().await;

        assert!(transport.push_channels.lock().unwrap().contains_key("ns1.a"));
    }

    #[tokio::test]
    async fn loopback_messages_never_reach_the_user_callback() {
        let transport = Arc::new(FakeTransport::new("c1", "ns1"));
        let session = connected_session(transport.clone()).await;

        let received: Arc<StdMutex<Vec<serde_json::Value>>> = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();
        session.on("a", Handler::sync(move |payload| received_clone.lock().unwrap().push(payload))).await.unwrap();

        let self_envelope = Envelope::new("c1", "a", serde_json::json!({ "n": 1 }));
        transport.deliver(
            "ns1.a",
            RawMessage { subject: "ns1.a".to_string(), payload: self_envelope.encode_json().unwrap() },
        );

        let other_envelope = Envelope::new("someone-else", "a", serde_json::json!({ "n": 2 }));
        transport.deliver(
            "ns1.a",
            RawMessage { subject: "ns1.a".to_string(), payload: other_envelope.encode_json().unwrap() },
        );

        tokio::time::sleep(Duration::from_millis(50)).await;

        let messages = received.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["n"], 2);
    }

    #[tokio::test]
    async fn offline_replay_result_reflects_publish_outcome() {
        let transport = Arc::new(FakeTransport::new("c1", "ns1"));
        let session = Session::new_for_test(test_config(), InitOpts::default(), transport.clone());

        session.publish("orders", serde_json::json!({ "n": 1 })).await.unwrap();

        transport.fail_next_publishes();
        session.connect().await.unwrap();
        let reports = session.drain_and_replay().await;
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].resent);

        transport.let_publishes_through();
        assert!(transport.published_topics().is_empty());
    }
}
