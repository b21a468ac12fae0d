//! The topic registration table: `on`/`off` bookkeeping, plus the
//! per-topic cancellation handle that tells a running push-consumer loop to
//! stop when the caller detaches.
//!
//! Generic over the handler type so the core session (callbacks of shape
//! `Fn(Value)`, see [`rx_domain::Handler`]) and the queue extension
//! (callbacks of shape `Fn(QueueMessage)`, see `crate::queue::QueueHandler`)
//! can share the same bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Notify;

pub(crate) struct Registration<H> {
    pub handler: H,
    pub cancel: Option<Arc<Notify>>,
}

pub(crate) struct RegistrationTable<H> {
    rows: HashMap<String, Registration<H>>,
}

impl<H> Default for RegistrationTable<H> {
    fn default() -> Self {
        RegistrationTable { rows: HashMap::new() }
    }
}

impl<H: Clone> RegistrationTable<H> {
    /// Inserts a new row. Returns `false` without touching the existing row
    /// if `topic` is already registered — `on`/`consume` are idempotent.
    pub fn insert(&mut self, topic: String, handler: H) -> bool {
        if self.rows.contains_key(&topic) {
            return false;
        }
        self.rows.insert(topic, Registration { handler, cancel: None });
        true
    }

    pub fn remove(&mut self, topic: &str) -> Option<Registration<H>> {
        self.rows.remove(topic)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.rows.contains_key(topic)
    }

    pub fn handler(&self, topic: &str) -> Option<H> {
        self.rows.get(topic).map(|r| r.handler.clone())
    }

    pub fn set_cancel(&mut self, topic: &str, cancel: Arc<Notify>) {
        if let Some(row) = self.rows.get_mut(topic) {
            row.cancel = Some(cancel);
        }
    }

    pub fn topics(&self) -> impl Iterator<Item = &String> {
        self.rows.keys()
    }

    /// Wakes and drops every cancellation handle without touching the rows
    /// themselves — used when the transport drops the underlying connection
    /// out from under every running consumer loop at once, as happens on a
    /// transport disconnect.
    pub fn clear_cancel_handles(&mut self) {
        for row in self.rows.values_mut() {
            if let Some(cancel) = row.cancel.take() {
                cancel.notify_waiters();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rx_domain::Handler;
    use serde_json::Value;

    #[test]
    fn insert_is_idempotent() {
        let mut table: RegistrationTable<Handler> = RegistrationTable::default();
        assert!(table.insert("a".into(), Handler::sync(|_: Value| {})));
        assert!(!table.insert("a".into(), Handler::sync(|_: Value| {})));
        assert!(table.contains("a"));
    }

    #[test]
    fn remove_returns_the_row() {
        let mut table: RegistrationTable<Handler> = RegistrationTable::default();
        table.insert("a".into(), Handler::sync(|_: Value| {}));
        assert!(table.remove("a").is_some());
        assert!(table.remove("a").is_none());
    }
}
