//! Push consumer registry: one JetStream
//! consumer per registered topic, bound to an async message loop that
//! decodes the envelope, drops loopback, and dispatches to the user
//! callback.

use std::sync::Arc;

use tokio::sync::{Notify, RwLock};
use tracing::warn;

use rx_domain::{ClientId, Envelope, Handler};
use rx_ports::{PushConsumerSpec, PushSubscription, Transport};
use rx_subject::presence_variant;

use crate::dispatch;
use crate::registration::RegistrationTable;

/// Creates the push consumer for `topic` and spawns its receive loop.
/// Returns the cancellation handle the caller should stash on the
/// registration row so `off`/disconnect can stop the loop.
pub(crate) async fn spawn(
    transport: Arc<dyn Transport>,
    stream: String,
    topic: String,
    wire_subject: String,
    client_id: Option<ClientId>,
    registrations: Arc<RwLock<RegistrationTable<Handler>>>,
) -> Result<Arc<Notify>, rx_domain::RtError> {
    let spec = PushConsumerSpec {
        name: wire_subject.clone(),
        filter_subjects: vec![wire_subject.clone(), presence_variant(&wire_subject)],
    };

    let mut subscription = transport.add_push_consumer(&stream, spec).await?;
    let cancel = Arc::new(Notify::new());
    let loop_cancel = cancel.clone();

    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = loop_cancel.notified() => break,
                msg = subscription.recv() => msg,
            };

            let Some(msg) = msg else { break };

            let envelope = match Envelope::decode_json(&msg.payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, subject = %msg.subject, "dropping undecodable message");
                    continue;
                }
            };

            if client_id.as_ref().map(|id| id.0.as_str()) == Some(envelope.client_id.as_str()) {
                continue;
            }

            let handler = { registrations.read().await.handler(&topic) };
            if let Some(handler) = handler {
                dispatch::invoke(handler, envelope.message);
            }
        }
    });

    Ok(cancel)
}
