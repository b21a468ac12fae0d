//! Linear-backoff retry for the bounded, internal create-or-update calls
//! the session makes against the transport (stream reconciliation, consumer
//! creation, namespace resolution). Per-step delay is fixed rather than
//! exponential — these are single-digit-attempt operations against a
//! service, not a long-haul retry policy.

use std::time::Duration;

use tracing::warn;

use rx_domain::RtError;

const STEP_DELAY: Duration = Duration::from_millis(200);

pub(crate) async fn retry<T, Fut>(attempts: u32, mut op: impl FnMut() -> Fut) -> Result<T, RtError>
where
    Fut: std::future::Future<Output = Result<T, RtError>>,
{
    let attempts = attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt < attempts {
                    warn!(attempt, max = attempts, error = %e, "retrying");
                    tokio::time::sleep(STEP_DELAY).await;
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry(5, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RtError::transport("not yet"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RtError> = retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(RtError::transport("nope")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
