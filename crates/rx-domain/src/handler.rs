use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type SyncFn = Arc<dyn Fn(Value) + Send + Sync>;
type AsyncFn = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// A registered topic callback.
///
/// Rust has no runtime "is this a coroutine function" check, so the
/// sync/async split becomes a compile-time choice of constructor:
/// [`Handler::sync`] for a plain closure, [`Handler::async_fn`] for one
/// that returns a future. Dispatch (including panic isolation) is the
/// caller's responsibility — see the session crate's dispatcher.
#[derive(Clone)]
pub enum Handler {
    Sync(SyncFn),
    Async(AsyncFn),
}

impl Handler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    pub fn async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Handler::Async(Arc::new(move |value| Box::pin(f(value))))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync(..)"),
            Handler::Async(_) => f.write_str("Handler::Async(..)"),
        }
    }
}
