/// Public lifecycle event names, exposed to applications as string constants
/// so user code can compare against them without importing the enum (useful
/// for logging and for cross-language parity with the original SDK).
pub const CONNECTED: &str = "CONNECTED";
pub const RECONNECT: &str = "RECONNECT";
pub const MESSAGE_RESEND: &str = "MESSAGE_RESEND";
pub const DISCONNECTED: &str = "DISCONNECTED";

/// Private phase names, never valid as user topics but also never dispatched
/// through the topic registration table directly — they only ever appear as
/// the payload of a `RECONNECT` event.
pub(crate) const RECONNECTING: &str = "RECONNECTING";
pub(crate) const RECONNECTED: &str = "RECONNECTED";
pub(crate) const RECONN_FAIL: &str = "RECONN_FAIL";

/// All names a user topic must never equal.
pub const RESERVED_LIFECYCLE_NAMES: &[&str] = &[
    CONNECTED,
    RECONNECT,
    MESSAGE_RESEND,
    DISCONNECTED,
    RECONNECTING,
    RECONNECTED,
    RECONN_FAIL,
];

pub fn is_reserved_lifecycle_name(topic: &str) -> bool {
    RESERVED_LIFECYCLE_NAMES.contains(&topic)
}
