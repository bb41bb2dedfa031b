//! A distributed actor runtime over long-lived WebSocket connections.
//!
//! Each participating process is a node identified by a random
//! [`NodeId`](crate::actor::NodeId) exchanged during the connection
//! handshake. Method invocations are serialized into JSON envelopes,
//! correlated with their replies by call id, and routed to the owning node
//! of the target [`ActorId`](crate::actor::ActorId), waiting when
//! necessary for that node to (re)connect. Delivery is at-most-once with
//! explicit failure reporting.

#![forbid(unsafe_code)]
#![warn(
  rust_2018_idioms,
  unreachable_pub,
  rustdoc::broken_intra_doc_links,
  rustdoc::private_intra_doc_links,
  rustdoc::private_doc_tests
)]

pub mod actor;
mod net;
#[cfg(test)]
mod tests;

pub use crate::net::address::AddressScheme;
pub use crate::net::address::ServerAddress;
pub use crate::net::client::ClientManager;
pub use crate::net::client::ClientMonitor;
pub use crate::net::client::ClientStatus;
pub use crate::net::server::ServerManager;
pub use crate::net::Manager;
