use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::RtError;

/// The client's structured wrapper around an application payload.
///
/// On the wire this is JSON-encoded for the core client and MsgPack-encoded
/// for the queue extension; the shape is identical in both cases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub client_id: String,
    pub id: Uuid,
    pub room: String,
    pub message: Value,
    /// Unix epoch milliseconds.
    pub start: i64,
}

impl Envelope {
    pub fn new(client_id: impl Into<String>, topic: impl Into<String>, message: Value) -> Self {
        Envelope {
            client_id: client_id.into(),
            id: Uuid::new_v4(),
            room: topic.into(),
            message,
            start: Utc::now().timestamp_millis(),
        }
    }

    pub fn encode_json(&self) -> Result<Vec<u8>, RtError> {
        serde_json::to_vec(self).map_err(|e| RtError::config(format!("encoding envelope: {e}")))
    }

    pub fn decode_json(bytes: &[u8]) -> Result<Self, RtError> {
        serde_json::from_slice(bytes).map_err(|e| RtError::config(format!("decoding envelope: {e}")))
    }

    pub fn encode_msgpack(&self) -> Result<Vec<u8>, RtError> {
        rmp_serde::to_vec_named(self).map_err(|e| RtError::config(format!("encoding envelope: {e}")))
    }

    pub fn decode_msgpack(bytes: &[u8]) -> Result<Self, RtError> {
        rmp_serde::from_slice(bytes).map_err(|e| RtError::config(format!("decoding envelope: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_fields() {
        let env = Envelope::new("client-1", "orders", serde_json::json!({"n": 1}));
        let bytes = env.encode_json().unwrap();
        let decoded = Envelope::decode_json(&bytes).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn msgpack_round_trip_preserves_fields() {
        let env = Envelope::new("client-1", "q.a.b", serde_json::json!(["x", 1, {"y": true}]));
        let bytes = env.encode_msgpack().unwrap();
        let decoded = Envelope::decode_msgpack(&bytes).unwrap();
        assert_eq!(env, decoded);
    }
}
