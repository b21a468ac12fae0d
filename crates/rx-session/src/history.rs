//! History reads: a time-windowed, ephemeral JetStream
//! consumer over a single wire subject, decoded back into envelopes.

use chrono::{DateTime, Utc};

use rx_domain::{Envelope, RtError};
use rx_ports::Transport;

use crate::publisher::Encoding;

pub(crate) async fn read(
    transport: &dyn Transport,
    stream: &str,
    wire_subject: &str,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    encoding: Encoding,
) -> Result<Vec<Envelope>, RtError> {
    let raw = transport.history(stream, wire_subject, start, end).await?;
    raw.into_iter().map(|m| encoding.decode(&m.payload)).collect()
}
