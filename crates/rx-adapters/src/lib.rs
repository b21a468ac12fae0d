//! NATS JetStream transport adapter for the Relay-X client SDK.
//!
//! `rx-session` is written against [`rx_ports::Transport`] only; this crate
//! supplies the one real implementation, plus a few collaborators that sit
//! beside it: credential materialization, namespace resolution, and
//! server-error diagnostics. One file per concern; `lib.rs` just wires the
//! modules up.

mod creds;
mod diagnostics;
mod namespace;
mod nats;

pub use creds::materialize as materialize_creds;
pub use diagnostics::Diagnostics;
pub use namespace::{resolve_namespace, resolve_queue_namespace};
pub use nats::{Endpoints, NatsTransport};
