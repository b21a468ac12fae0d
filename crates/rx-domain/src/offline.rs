use serde_json::Value;

/// An entry captured by the offline publish buffer while the session was
/// disconnected. Drained FIFO on the first successful reconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineEntry {
    pub topic: String,
    pub message: Value,
}
