//! [`Transport`] over `async-nats` JetStream — the one real collaborator
//! `rx-session` drives. The "push" variant still rides a NATS JetStream
//! pull consumer under the hood (the idiomatic
//! Rust client's `Consumer::messages()` ordered stream), but acks each
//! message before handing it back, so the port-level contract ("ack
//! precedes user callback") holds regardless of what NATS calls it.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_nats::jetstream::{
    self,
    consumer::{pull, AckKind, AckPolicy, DeliverPolicy, ReplayPolicy},
    stream::Config as StreamConfig,
    Message as JsMessage,
};
use async_nats::{Client, ConnectOptions, Event};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, instrument, warn};

use rx_domain::{ClientId, RtError};
use rx_ports::{
    LifecycleCallback, PullConsumer, PullConsumerSpec, PullMessage, PushConsumerSpec,
    PushSubscription, RawMessage, Transport, TransportEvent,
};

use crate::diagnostics::Diagnostics;

/// Server lists: staging binds `0.0.0.0`, production `api.relay-x.io`,
/// both across ports 4221..4226.
#[derive(Debug, Clone, Copy)]
pub enum Endpoints {
    Staging,
    Production,
}

impl Endpoints {
    pub fn servers(self) -> Vec<String> {
        let host = match self {
            Endpoints::Staging => "0.0.0.0",
            Endpoints::Production => "api.relay-x.io",
        };
        (4221..=4226).map(|port| format!("nats://{host}:{port}")).collect()
    }
}

struct Inner {
    client: Client,
    jetstream: jetstream::Context,
}

/// `Transport` implementation backing a `Session`. One instance per
/// credential pair — owned by the session that created it, never a
/// process-global singleton.
pub struct NatsTransport {
    servers: Vec<String>,
    token: String,
    creds_path: std::path::PathBuf,
    max_reconnect_attempts: usize,
    reconnect_time_wait: Duration,
    inner: RwLock<Option<Inner>>,
    client_id: StdMutex<Option<ClientId>>,
    diagnostics: Diagnostics,
}

impl NatsTransport {
    pub fn new(
        endpoints: Endpoints,
        token: impl Into<String>,
        creds_path: impl Into<std::path::PathBuf>,
    ) -> Self {
        NatsTransport {
            servers: endpoints.servers(),
            token: token.into(),
            creds_path: creds_path.into(),
            max_reconnect_attempts: 1200,
            reconnect_time_wait: Duration::from_secs(1),
            inner: RwLock::new(None),
            client_id: StdMutex::new(None),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn jetstream(&self) -> Result<jetstream::Context, RtError> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|i| i.jetstream.clone())
            .ok_or_else(|| RtError::transport("not connected"))
    }

    fn classify_or_transport(&self, raw: String) -> RtError {
        self.diagnostics.classify(&raw, None).unwrap_or_else(|| RtError::transport(raw))
    }
}

#[async_trait]
impl Transport for NatsTransport {
    #[instrument(skip(self, on_event))]
    async fn connect(&self, on_event: LifecycleCallback) -> Result<(), RtError> {
        let ever_connected = Arc::new(AtomicBool::new(false));
        let connected_notify = Arc::new(Notify::new());
        let reconnect_deadline =
            self.reconnect_time_wait * self.max_reconnect_attempts as u32;

        let cb = on_event.clone();
        let cb_ever_connected = ever_connected.clone();
        let cb_notify = connected_notify.clone();
        let fail_deadline = reconnect_deadline;

        let options = ConnectOptions::new()
            .token(self.token.clone())
            .user_credentials(self.creds_path.clone())
            .require_tls(false)
            .no_echo()
            .retry_on_initial_connect()
            .max_reconnects(Some(self.max_reconnect_attempts))
            .event_callback(move |event| {
                let cb = cb.clone();
                let ever_connected = cb_ever_connected.clone();
                let notify = cb_notify.clone();
                async move {
                    match event {
                        Event::Connected => {
                            notify.notify_waiters();
                            if ever_connected.swap(true, Ordering::SeqCst) {
                                info!("reconnected to relay");
                                cb(TransportEvent::Reconnected);
                            } else {
                                info!("connected to relay");
                                cb(TransportEvent::Connected);
                            }
                        }
                        Event::Disconnected => {
                            warn!("disconnected from relay");
                            cb(TransportEvent::Disconnected);
                            cb(TransportEvent::ReconnectAttempt);

                            let cb = cb.clone();
                            let notify = notify.clone();
                            tokio::spawn(async move {
                                tokio::select! {
                                    _ = notify.notified() => {}
                                    _ = tokio::time::sleep(fail_deadline) => {
                                        cb(TransportEvent::ReconnectFailed);
                                    }
                                }
                            });
                        }
                        Event::ClientError(e) => cb(TransportEvent::Error(e.to_string())),
                        Event::ServerError(e) => cb(TransportEvent::Error(e.to_string())),
                        _ => {}
                    }
                }
            });

        let client = options
            .connect(self.servers.clone())
            .await
            .map_err(|e| RtError::transport(format!("connecting to relay: {e}")))?;

        let assigned_id = client.server_info().client_id;
        *self.client_id.lock().unwrap() = Some(ClientId(assigned_id.to_string()));

        let js = jetstream::new(client.clone());
        *self.inner.write().await = Some(Inner { client, jetstream: js });

        on_event(TransportEvent::Connected);
        ever_connected.store(true, Ordering::SeqCst);

        Ok(())
    }

    fn client_id(&self) -> Option<ClientId> {
        self.client_id.lock().unwrap().clone()
    }

    #[instrument(skip(self, payload))]
    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, RtError> {
        let inner = self.inner.read().await;
        let inner = inner.as_ref().ok_or_else(|| RtError::transport("not connected"))?;

        let resp = tokio::time::timeout(timeout, inner.client.request(subject.to_string(), payload.into()))
            .await
            .map_err(|_| RtError::transport(format!("request to {subject} timed out")))?
            .map_err(|e| self.classify_or_transport(format!("request to {subject}: {e}")))?;

        Ok(resp.payload.to_vec())
    }

    #[instrument(skip(self, payload))]
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), RtError> {
        let js = self.jetstream().await?;
        let ack = js
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| self.classify_or_transport(format!("publishing to {subject}: {e}")))?;

        ack.await.map_err(|e| RtError::transport(format!("publish ack for {subject}: {e}")))?;
        debug!(subject, "publish acked");
        Ok(())
    }

    async fn stream_subjects(&self, stream: &str) -> Result<Option<Vec<String>>, RtError> {
        let js = self.jetstream().await?;
        match js.get_stream(stream).await {
            Ok(mut handle) => {
                let info = handle
                    .info()
                    .await
                    .map_err(|e| RtError::transport(format!("reading stream {stream}: {e}")))?;
                Ok(Some(info.config.subjects.clone()))
            }
            Err(_) => Ok(None),
        }
    }

    #[instrument(skip(self, subjects))]
    async fn create_stream(&self, stream: &str, subjects: Vec<String>) -> Result<(), RtError> {
        let js = self.jetstream().await?;
        js.create_stream(StreamConfig { name: stream.to_string(), subjects, ..Default::default() })
            .await
            .map_err(|e| RtError::transport(format!("creating stream {stream}: {e}")))?;
        info!(stream, "stream created");
        Ok(())
    }

    #[instrument(skip(self, subjects))]
    async fn update_stream(&self, stream: &str, subjects: Vec<String>) -> Result<(), RtError> {
        let js = self.jetstream().await?;
        js.update_stream(StreamConfig { name: stream.to_string(), subjects, ..Default::default() })
            .await
            .map_err(|e| RtError::transport(format!("updating stream {stream}: {e}")))?;
        debug!(stream, "stream subjects reconciled");
        Ok(())
    }

    #[instrument(skip(self, spec), fields(consumer = %spec.name))]
    async fn add_push_consumer(
        &self,
        stream: &str,
        spec: PushConsumerSpec,
    ) -> Result<Box<dyn PushSubscription>, RtError> {
        let js = self.jetstream().await?;
        let stream_handle = js
            .get_stream(stream)
            .await
            .map_err(|e| RtError::transport(format!("stream {stream}: {e}")))?;

        let config = pull::Config {
            durable_name: Some(spec.name.clone()),
            name: Some(spec.name.clone()),
            filter_subjects: spec.filter_subjects.clone(),
            deliver_policy: DeliverPolicy::New,
            replay_policy: ReplayPolicy::Instant,
            ack_policy: AckPolicy::Explicit,
            ..Default::default()
        };

        let consumer = stream_handle
            .get_or_create_consumer(&spec.name, config)
            .await
            .map_err(|e| RtError::transport(format!("consumer {}: {e}", spec.name)))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| RtError::transport(format!("consumer stream {}: {e}", spec.name)))?;

        Ok(Box::new(NatsPushSubscription { messages: Box::pin(messages) }))
    }

    #[instrument(skip(self, spec), fields(consumer = %spec.durable_name))]
    async fn add_pull_consumer(
        &self,
        stream: &str,
        spec: PullConsumerSpec,
    ) -> Result<Arc<dyn PullConsumer>, RtError> {
        let js = self.jetstream().await?;
        let stream_handle = js
            .get_stream(stream)
            .await
            .map_err(|e| RtError::transport(format!("stream {stream}: {e}")))?;

        // Omit deliver_policy on update to avoid server rejection.
        let is_update = stream_handle.get_consumer::<pull::Config>(&spec.durable_name).await.is_ok();

        let config = pull::Config {
            durable_name: Some(spec.durable_name.clone()),
            name: Some(spec.durable_name.clone()),
            deliver_group: Some(spec.deliver_group.clone()),
            filter_subject: spec.filter_subject.clone(),
            deliver_policy: if is_update { DeliverPolicy::All } else { DeliverPolicy::New },
            replay_policy: ReplayPolicy::Instant,
            ack_policy: AckPolicy::Explicit,
            ack_wait: spec.ack_wait.unwrap_or(Duration::from_secs(30)),
            backoff: spec.backoff.clone(),
            max_deliver: spec.max_deliver.unwrap_or(-1),
            max_ack_pending: spec.max_ack_pending.unwrap_or(1000) as i64,
            ..Default::default()
        };

        let consumer = stream_handle
            .create_consumer(config)
            .await
            .map_err(|e| RtError::transport(format!("pull consumer {}: {e}", spec.durable_name)))?;

        Ok(Arc::new(NatsPullConsumer { consumer }))
    }

    async fn delete_consumer(&self, stream: &str, name: &str) -> Result<bool, RtError> {
        let js = self.jetstream().await?;
        let stream_handle = js
            .get_stream(stream)
            .await
            .map_err(|e| RtError::transport(format!("stream {stream}: {e}")))?;

        Ok(stream_handle.delete_consumer(name).await.is_ok())
    }

    #[instrument(skip(self))]
    async fn history(
        &self,
        stream: &str,
        subject: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawMessage>, RtError> {
        let js = self.jetstream().await?;
        let stream_handle = js
            .get_stream(stream)
            .await
            .map_err(|e| RtError::transport(format!("stream {stream}: {e}")))?;

        let config = pull::Config {
            filter_subject: subject.to_string(),
            deliver_policy: DeliverPolicy::ByStartTime { start_time: start },
            replay_policy: ReplayPolicy::Instant,
            ack_policy: AckPolicy::None,
            ..Default::default()
        };

        let consumer = stream_handle
            .create_consumer(config)
            .await
            .map_err(|e| RtError::transport(format!("history consumer for {subject}: {e}")))?;
        let consumer_name = consumer.cached_info().name.clone();

        let mut out = Vec::new();
        let mut empty_fetches = 0;

        // Ephemeral consumer cleanup: stop after a bounded run of empty
        // fetches rather than reading forever.
        while empty_fetches < 3 && out.len() < 10_000 {
            let batch = consumer
                .fetch()
                .max_messages(100)
                .expires(Duration::from_millis(500))
                .messages()
                .await
                .map_err(|e| RtError::transport(format!("fetching history for {subject}: {e}")))?;
            tokio::pin!(batch);

            let mut got_any = false;
            while let Some(item) = batch.next().await {
                let msg = item.map_err(|e| RtError::transport(format!("history message: {e}")))?;
                if let Some(end) = end {
                    let published = msg.info().map(|i| i.published).unwrap_or(start);
                    if published > end {
                        got_any = true;
                        continue;
                    }
                }
                out.push(RawMessage { subject: msg.subject.to_string(), payload: msg.payload.to_vec() });
                got_any = true;
            }

            if got_any {
                empty_fetches = 0;
            } else {
                empty_fetches += 1;
            }
        }

        let _ = stream_handle.delete_consumer(&consumer_name).await;
        Ok(out)
    }

    async fn close(&self) -> Result<(), RtError> {
        if let Some(inner) = self.inner.write().await.take() {
            inner.client.drain().await.map_err(|e| RtError::transport(format!("closing connection: {e}")))?;
        }
        Ok(())
    }
}

struct NatsPushSubscription {
    messages: Pin<Box<dyn Stream<Item = Result<JsMessage, async_nats::jetstream::consumer::pull::MessagesError>> + Send>>,
}

#[async_trait]
impl PushSubscription for NatsPushSubscription {
    async fn recv(&mut self) -> Option<RawMessage> {
        loop {
            match self.messages.next().await? {
                Ok(msg) => {
                    let subject = msg.subject.to_string();
                    let payload = msg.payload.to_vec();
                    if let Err(e) = msg.ack().await {
                        warn!(error = %e, subject, "ack failed");
                    }
                    return Some(RawMessage { subject, payload });
                }
                Err(e) => {
                    warn!(error = %e, "push consumer message error");
                    continue;
                }
            }
        }
    }
}

struct NatsPullConsumer {
    consumer: jetstream::consumer::Consumer<pull::Config>,
}

#[async_trait]
impl PullConsumer for NatsPullConsumer {
    async fn fetch_one(&self, timeout: Duration) -> Result<Option<Box<dyn PullMessage>>, RtError> {
        let batch = self
            .consumer
            .fetch()
            .max_messages(1)
            .expires(timeout)
            .messages()
            .await
            .map_err(|e| RtError::transport(format!("pull fetch: {e}")))?;
        tokio::pin!(batch);

        match batch.next().await {
            Some(Ok(msg)) => Ok(Some(Box::new(NatsPullMessage { msg }))),
            Some(Err(e)) => Err(RtError::transport(format!("pull message: {e}"))),
            None => Ok(None),
        }
    }
}

struct NatsPullMessage {
    msg: JsMessage,
}

#[async_trait]
impl PullMessage for NatsPullMessage {
    fn subject(&self) -> &str {
        self.msg.subject.as_str()
    }

    fn payload(&self) -> &[u8] {
        &self.msg.payload
    }

    async fn ack(&self) -> Result<(), RtError> {
        self.msg.ack().await.map_err(|e| RtError::transport(format!("ack: {e}")))
    }

    async fn nak(&self) -> Result<(), RtError> {
        self.msg
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| RtError::transport(format!("nak: {e}")))
    }

    async fn term(&self) -> Result<(), RtError> {
        self.msg.ack_with(AckKind::Term).await.map_err(|e| RtError::transport(format!("term: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_and_production_endpoint_lists_cover_six_ports() {
        let staging = Endpoints::Staging.servers();
        let prod = Endpoints::Production.servers();
        assert_eq!(staging.len(), 6);
        assert_eq!(prod.len(), 6);
        assert_eq!(staging[0], "nats://0.0.0.0:4221");
        assert_eq!(prod[5], "nats://api.relay-x.io:4226");
    }
}
