//! The Relay-X client SDK's session and subscription manager.
//!
//! [`Session`] is the crate's entry point: it owns the transport, the topic
//! registration table, the offline publish buffer, and any [`Queue`]s
//! created off it, and exposes the public `on`/`off`/`publish`/`history`/
//! `connect`/`close`/`init_queue` surface. Everything else here is a leaf
//! collaborator `Session` drives internally.

mod buffer;
mod config;
mod consumers;
mod dispatch;
mod history;
mod publisher;
mod queue;
mod registration;
mod retry;
mod session;
mod stream;

pub use config::{Config, InitOpts};
pub use queue::{ConsumeConfig, Queue, QueueHandler, QueueMessage};
pub use session::{Session, LIFECYCLE_CONNECTED, LIFECYCLE_DISCONNECTED, MESSAGE_RESEND, RECONNECT};

pub use rx_adapters::Endpoints;
pub use rx_domain::{
    ClientId, ConnectionState, Envelope, Handler, LifecycleEvent, OfflineEntry, Phase, ResendReport, RtError,
};
