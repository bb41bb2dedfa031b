use core::any::type_name;
use std::fmt::Display;
use std::fmt::Formatter;
use std::hash::Hash;
use std::hash::Hasher;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// The stable identity of a node, generated randomly when the node starts
/// and exchanged with every peer during the connection handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
  /// Generates a fresh node id.
  pub fn random() -> NodeId {
    NodeId(Uuid::new_v4())
  }
}

impl Display for NodeId {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

/// The identity of an actor instance.
///
/// An [`ActorId`] is an opaque token, an optional type tag recording the
/// declared actor type, and the [`NodeId`] of the owning node. An id without
/// a `node` refers to an actor local to the creating node; outbound routing
/// requires the `node` field to be populated.
///
/// Equality and hashing consider `id` and `node` together. The type tag is
/// metadata for diagnostics and on-demand construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorId {
  id: String,
  #[serde(rename = "type")]
  actor_type: Option<String>,
  node: Option<NodeId>,
}

impl ActorId {
  /// Creates an id from an existing opaque token.
  pub fn new(id: impl Into<String>) -> ActorId {
    ActorId {
      id: id.into(),
      actor_type: None,
      node: None,
    }
  }

  /// Mints a fresh random id without a type tag.
  pub fn random() -> ActorId {
    ActorId::new(Uuid::new_v4().to_string())
  }

  /// Mints a fresh random id tagged with the name of the actor type `A`.
  pub fn random_for<A: 'static>() -> ActorId {
    ActorId {
      id: Uuid::new_v4().to_string(),
      actor_type: Some(type_name::<A>().to_owned()),
      node: None,
    }
  }

  /// Returns a copy of this id with the `node` field set to `node`.
  pub fn with_node(&self, node: NodeId) -> ActorId {
    ActorId {
      id: self.id.clone(),
      actor_type: self.actor_type.clone(),
      node: Some(node),
    }
  }

  /// The opaque token part of this id.
  pub fn id(&self) -> &str {
    &self.id
  }

  /// The declared actor type, if one was recorded.
  pub fn actor_type(&self) -> Option<&str> {
    self.actor_type.as_deref()
  }

  /// The owning node, if this id has been stamped with one.
  pub fn node(&self) -> Option<NodeId> {
    self.node
  }

  /// Whether this id carries the type tag of the actor type `A`.
  pub fn has_type_for<A: 'static>(&self) -> bool {
    self.actor_type.as_deref() == Some(type_name::<A>())
  }
}

impl PartialEq for ActorId {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id && self.node == other.node
  }
}

impl Eq for ActorId {}

impl Hash for ActorId {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.id.hash(state);
    self.node.hash(state);
  }
}

impl Display for ActorId {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.node {
      Some(node) => write!(f, "{}@{node}", self.id),
      None => f.write_str(&self.id),
    }
  }
}
