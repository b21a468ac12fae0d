use serde::Serialize;
use serde_json::Value;

/// Phase of a `RECONNECT` lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Reconnecting,
    Reconnected,
    ReconnFail,
}

impl Phase {
    /// The phase name passed as the `RECONNECT` callback argument. Distinct
    /// from a topic name — these strings are reserved as topics (see
    /// [`crate::is_reserved_lifecycle_name`]) but are valid event payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Reconnecting => crate::constants::RECONNECTING,
            Phase::Reconnected => crate::constants::RECONNECTED,
            Phase::ReconnFail => crate::constants::RECONN_FAIL,
        }
    }
}

/// Outcome of replaying one entry from the offline publish buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResendReport {
    pub topic: String,
    pub message: Value,
    pub resent: bool,
}

/// Session-level events delivered at most once per occurrence to every
/// callback registered against the matching reserved name.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Connected,
    Reconnect(Phase),
    Disconnected,
    MessageResend(Vec<ResendReport>),
}

impl LifecycleEvent {
    /// The reserved topic name this event is dispatched under.
    pub fn topic(&self) -> &'static str {
        match self {
            LifecycleEvent::Connected => crate::constants::CONNECTED,
            LifecycleEvent::Reconnect(_) => crate::constants::RECONNECT,
            LifecycleEvent::Disconnected => crate::constants::DISCONNECTED,
            LifecycleEvent::MessageResend(_) => crate::constants::MESSAGE_RESEND,
        }
    }
}
