//! Dispatch of a resolved handler against a payload.
//!
//! Both variants of user callback run detached from whatever lock produced
//! them: a sync handler never blocks the caller (it runs on the blocking
//! pool), an async handler is spawned as its own task. Either way a panic
//! or error inside user code is caught here and never reaches the consumer
//! loop or the transport's event callback.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use tracing::debug;

use rx_domain::Handler;

pub(crate) fn invoke(handler: Handler, payload: Value) {
    match handler {
        Handler::Sync(f) => {
            tokio::task::spawn_blocking(move || {
                if std::panic::catch_unwind(AssertUnwindSafe(|| f(payload))).is_err() {
                    debug!("user callback panicked");
                }
            });
        }
        Handler::Async(f) => {
            tokio::spawn(async move {
                if AssertUnwindSafe(f(payload)).catch_unwind().await.is_err() {
                    debug!("user callback panicked");
                }
            });
        }
    }
}
