use std::time::Duration;

use uuid::Uuid;

use crate::actor::ActorId;
use crate::actor::NodeId;

/// Alias for a `Result` with the error type [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors produced by the actor runtime.
///
/// Connection-level failures close the connection and fail every in-flight
/// call routed through it; per-call failures surface only to the caller that
/// awaits them.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
  /// The id is unknown locally and the on-demand resolver produced nothing.
  #[error("actor `{0}` could not be resolved on this node")]
  ResolveFailed(ActorId),
  /// A typed resolve matched an actor of a different type.
  #[error("resolved actor has type `{found}`, expected `{expected}`")]
  ResolveFailedToMatchActorType { found: String, expected: String },
  /// An outbound call was attempted with an [`ActorId`] missing its node.
  #[error("actor id `{0}` carries no node id to route to")]
  MissingNodeId(ActorId),
  /// No live connection to the target node exists.
  #[error("no live connection to node `{0}`")]
  NoRemoteNode(NodeId),
  /// Waited for the target node to connect; none appeared in time.
  #[error("timed out after {timeout:?} waiting for node `{node_id}` to connect")]
  TimeoutWaitingForNodeId { node_id: NodeId, timeout: Duration },
  /// The WebSocket upgrade or the node-id handshake failed.
  #[error("failed to upgrade connection: {0}")]
  FailedToUpgrade(String),
  /// A reply arrived for an unknown call id, typically after the caller
  /// cancelled and withdrew its continuation.
  #[error("no reply continuation registered for call `{0}`")]
  MissingReplyContinuation(Uuid),
  /// An argument or reply value did not decode to the expected type.
  #[error("failed to decode value: {0}")]
  DecodingFailure(#[source] serde_json::Error),
  /// An argument or reply value could not be encoded.
  #[error("failed to encode value: {0}")]
  EncodingFailure(#[source] serde_json::Error),
  /// Secure listeners are unsupported; terminate TLS in a reverse proxy.
  #[error("secure server transport is not supported, terminate TLS in a reverse proxy")]
  SecureServerNotSupported,
  /// A node-info accessor was called outside an inbound invocation.
  #[error("node info is only accessible while dispatching an inbound call")]
  NotInDistributedActor,
  /// The connection carrying this call closed before a reply arrived.
  #[error("connection to the remote node was lost")]
  ConnectionLost,
  /// The actor system was shut down.
  #[error("the actor system was shut down")]
  Shutdown,
  /// An invocation named a target the recipient does not implement.
  #[error("unexpected invocation target `{0}`")]
  UnexpectedInvocationTarget(String),
  /// An invocation carried fewer arguments than the target requires.
  #[error("invocation of `{target}` is missing argument {index}")]
  MissingArgument { target: String, index: usize },
  #[error(transparent)]
  Io(#[from] std::io::Error),
}
