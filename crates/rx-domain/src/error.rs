use thiserror::Error;

/// Errors raised by the Relay-X client SDK.
///
/// Argument-validation and credential problems are fatal to the call that
/// raised them. Connection and consumer issues drive the lifecycle state
/// machine instead (see [`crate::LifecycleEvent`]) and only reach a caller
/// when they occur before a session is established.
#[derive(Debug, Error)]
pub enum RtError {
    #[error("config error: {reason}")]
    Config { reason: String },

    #[error("namespace resolution failed: {reason}")]
    Namespace { reason: String },

    #[error("queue not found: {queue_id}")]
    QueueNotFound { queue_id: String },

    #[error("transport error: {reason}")]
    Transport { reason: String },

    #[error("permission violation on '{topic}': {raw}")]
    Permission { topic: String, raw: String },

    #[error("authorization violation: {raw}")]
    Auth { raw: String },

    #[error("quota exceeded (code {code}): {raw}")]
    Quota { code: i64, raw: String },
}

impl RtError {
    pub fn config(reason: impl Into<String>) -> Self {
        RtError::Config { reason: reason.into() }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        RtError::Transport { reason: reason.into() }
    }
}
