//! Offline publish buffer: FIFO accumulation while disconnected,
//! drained wholesale on reconnect.

use rx_domain::OfflineEntry;
use serde_json::Value;

#[derive(Default)]
pub(crate) struct OfflineBuffer {
    entries: Vec<OfflineEntry>,
}

impl OfflineBuffer {
    pub fn push(&mut self, topic: String, message: Value) {
        self.entries.push(OfflineEntry { topic, message });
    }

    /// Takes every buffered entry in arrival order, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<OfflineEntry> {
        std::mem::take(&mut self.entries)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
