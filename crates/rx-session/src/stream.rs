//! Stream reconciler: ensure a stream exists and carries the
//! union of every currently-registered wire subject plus its presence
//! variant. Idempotent — safe to call on every `on`/`consume` and on every
//! reconnect.

use std::collections::BTreeSet;

use rx_domain::RtError;
use rx_ports::Transport;

use crate::retry::retry;

/// `subjects` should already include presence variants — callers build that
/// list from the registration table via [`crate::wire_subjects`].
pub(crate) async fn reconcile(
    transport: &dyn Transport,
    stream: &str,
    subjects: &[String],
    max_retries: u32,
) -> Result<(), RtError> {
    retry(max_retries, || async {
        match transport.stream_subjects(stream).await? {
            None => transport.create_stream(stream, subjects.to_vec()).await,
            Some(existing) => {
                let merged: BTreeSet<String> =
                    existing.into_iter().chain(subjects.iter().cloned()).collect();
                transport.update_stream(stream, merged.into_iter().collect()).await
            }
        }
    })
    .await
}
