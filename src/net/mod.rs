//! The WebSocket transport: per-connection remote nodes, the directory of
//! live peers, the pending-reply registry, and the connection managers.

use async_trait::async_trait;

pub(crate) mod address;
pub(crate) mod client;
pub(crate) mod directory;
pub(crate) mod handshake;
pub(crate) mod message;
pub(crate) mod pending;
pub(crate) mod remote_node;
pub(crate) mod server;

/// Lifecycle supervisor for a server or client connection.
#[async_trait]
pub trait Manager: Send + Sync + 'static {
  /// Stops all work and releases resources, returning once every
  /// supervised task has observed the cancellation.
  async fn cancel(&self);
}
