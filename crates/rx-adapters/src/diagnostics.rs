use std::sync::atomic::{AtomicBool, Ordering};

use rx_domain::RtError;

const QUOTA_EXCEEDED_CODE: i64 = 10077;

/// Best-effort translator from raw NATS server error text to a structured
/// diagnostic. `code` is the server API error code when the transport
/// surfaces one (e.g. a `ServiceUnavailableError`'s `err_code`); `raw` is
/// always the untouched server message.
///
/// Tracks whether an auth violation has already been reported once per
/// session: the server repeats "Authorization Violation" on every failed
/// reconnect attempt, and re-logging it on every retry would drown out
/// everything else.
pub struct Diagnostics {
    auth_logged: AtomicBool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics { auth_logged: AtomicBool::new(false) }
    }

    pub fn classify(&self, raw: &str, code: Option<i64>) -> Option<RtError> {
        if code == Some(QUOTA_EXCEEDED_CODE) {
            return Some(RtError::Quota { code: QUOTA_EXCEEDED_CODE, raw: raw.to_string() });
        }

        if raw.contains("permissions violation") {
            return Some(RtError::Permission { topic: extract_quoted_topic(raw), raw: raw.to_string() });
        }

        if raw.contains("Authorization Violation") {
            if self.auth_logged.swap(true, Ordering::SeqCst) {
                return None;
            }
            return Some(RtError::Auth { raw: raw.to_string() });
        }

        None
    }

    pub fn reset(&self) {
        self.auth_logged.store(false, Ordering::SeqCst);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulls the first quoted substring out of the server message and drops its
/// leading two tokens (namespace, topic hash), leaving the topic the
/// application registered. Empty if the message carries no quoted subject.
fn extract_quoted_topic(raw: &str) -> String {
    let quoted = match raw.split('"').nth(1) {
        Some(q) => q,
        None => return String::new(),
    };

    let tokens: Vec<&str> = quoted.split('.').collect();
    if tokens.len() > 2 {
        tokens[2..].join(".")
    } else {
        String::new()
    }
}
