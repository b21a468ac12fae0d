//! Relay-X client SDK domain core.
//!
//! Pure types shared by every other crate in the workspace: the wire
//! envelope, the lifecycle event model, the topic callback abstraction, the
//! offline-buffer entry, and the SDK's error enum. Depends on nothing but
//! `serde`/`chrono`/`thiserror`/`uuid` — no transport, no runtime beyond
//! what's needed for future-typed callbacks, no adapter.

mod client_id;
mod constants;
mod envelope;
mod error;
mod handler;
mod lifecycle;
mod offline;
mod state;

pub use client_id::ClientId;
pub use constants::{
    is_reserved_lifecycle_name, CONNECTED, DISCONNECTED, MESSAGE_RESEND, RECONNECT,
    RESERVED_LIFECYCLE_NAMES,
};
pub use envelope::Envelope;
pub use error::RtError;
pub use handler::Handler;
pub use lifecycle::{LifecycleEvent, Phase, ResendReport};
pub use offline::OfflineEntry;
pub use state::ConnectionState;
