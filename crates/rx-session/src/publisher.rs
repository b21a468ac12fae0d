//! Publisher: validate, envelope, encode, submit — shared by the core
//! session (JSON) and the queue extension (MsgPack).

use rx_domain::{ClientId, Envelope, RtError};
use rx_ports::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Encoding {
    Json,
    MsgPack,
}

impl Encoding {
    fn encode(self, envelope: &Envelope) -> Result<Vec<u8>, RtError> {
        match self {
            Encoding::Json => envelope.encode_json(),
            Encoding::MsgPack => envelope.encode_msgpack(),
        }
    }

    pub(crate) fn decode(self, bytes: &[u8]) -> Result<Envelope, RtError> {
        match self {
            Encoding::Json => Envelope::decode_json(bytes),
            Encoding::MsgPack => Envelope::decode_msgpack(bytes),
        }
    }
}

/// Builds an envelope for `message` and publishes it to `wire_subject`,
/// waiting for the server ack. Returns `true` iff the ack was received,
/// `false` if the publish itself failed in a way that should not raise —
/// transport errors still propagate for anything the caller needs to retry
/// on.
pub(crate) async fn publish(
    transport: &dyn Transport,
    wire_subject: &str,
    client_id: &ClientId,
    topic: &str,
    message: serde_json::Value,
    encoding: Encoding,
) -> Result<bool, RtError> {
    let envelope = Envelope::new(client_id.to_string(), topic, message);
    let bytes = encoding.encode(&envelope)?;
    transport.publish(wire_subject, bytes).await?;
    Ok(true)
}
