use core::any::type_name;
use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::actor::ActorId;
use crate::actor::Error;
use crate::actor::NodeId;
use crate::actor::Result;

/// An addressable object whose methods can be invoked remotely.
///
/// Implementations match on the opaque invocation target, decode the
/// arguments they expect, and return the encoded result. The runtime never
/// serializes calls per actor; an actor that needs a mailbox discipline
/// brings its own.
#[async_trait]
pub trait Actor: Send + Sync + 'static {
  /// The identity this actor registered under.
  fn id(&self) -> &ActorId;

  /// Handles one inbound invocation, returning the encoded reply value
  /// (empty for void returns).
  async fn handle(&self, request: RequestContext) -> Result<Vec<u8>>;
}

/// Encodes a handler's return value for the reply envelope.
pub fn encode_reply<T: Serialize>(value: &T) -> Result<Vec<u8>> {
  serde_json::to_vec(value).map_err(Error::EncodingFailure)
}

/// Decodes the reply bytes of a [`remote_call`](crate::actor::ActorSystem::remote_call)
/// into the expected return type.
///
/// An inbound handler error is replied to as an empty value, so decoding it
/// fails here; the error detail intentionally never crosses the wire.
pub fn decode_reply<R: DeserializeOwned>(value: &[u8]) -> Result<R> {
  serde_json::from_slice(value).map_err(Error::DecodingFailure)
}

/// An outbound method invocation: the opaque target mangling, any
/// generic-type substitutions, and the ordered, already-encoded arguments.
#[derive(Debug, Clone)]
pub struct Invocation {
  target: String,
  generic_subs: Vec<String>,
  args: Vec<Vec<u8>>,
}

impl Invocation {
  /// Starts an invocation of `target`.
  pub fn new(target: impl Into<String>) -> Invocation {
    Invocation {
      target: target.into(),
      generic_subs: Vec::new(),
      args: Vec::new(),
    }
  }

  /// Appends an encoded argument.
  pub fn with_arg<T: Serialize>(mut self, arg: &T) -> Result<Invocation> {
    let encoded = serde_json::to_vec(arg).map_err(Error::EncodingFailure)?;
    self.args.push(encoded);
    Ok(self)
  }

  /// Records a generic-type substitution.
  pub fn with_generic_sub(mut self, sub: impl Into<String>) -> Invocation {
    self.generic_subs.push(sub.into());
    self
  }

  pub fn target(&self) -> &str {
    &self.target
  }

  pub fn generic_subs(&self) -> &[String] {
    &self.generic_subs
  }

  pub fn args(&self) -> &[Vec<u8>] {
    &self.args
  }

  /// Decodes the argument at `index`.
  pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
    let bytes = self.args.get(index).ok_or_else(|| Error::MissingArgument {
      target: self.target.clone(),
      index,
    })?;
    serde_json::from_slice(bytes).map_err(Error::DecodingFailure)
  }

  pub(crate) fn from_parts(target: String, generic_subs: Vec<String>, args: Vec<Vec<u8>>) -> Invocation {
    Invocation {
      target,
      generic_subs,
      args,
    }
  }

  pub(crate) fn into_parts(self) -> (String, Vec<String>, Vec<Vec<u8>>) {
    (self.target, self.generic_subs, self.args)
  }
}

/// The context of one inbound invocation handed to [`Actor::handle`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct RequestContext {
  pub invocation: Invocation,
  /// The node the call arrived from; the local node for local calls.
  pub peer: NodeId,
}

impl RequestContext {
  pub(crate) fn new(invocation: Invocation, peer: NodeId) -> RequestContext {
    RequestContext { invocation, peer }
  }
}

/// A type-erased registered actor: the dispatch object paired with an
/// `Any` handle so typed resolves can downcast it again.
#[derive(Clone)]
pub struct AnyActor {
  object: Arc<dyn Any + Send + Sync>,
  handler: Arc<dyn Actor>,
  type_name: &'static str,
}

impl AnyActor {
  pub fn new<A: Actor>(actor: Arc<A>) -> AnyActor {
    let object: Arc<dyn Any + Send + Sync> = Arc::clone(&actor) as Arc<dyn Any + Send + Sync>;
    AnyActor {
      object,
      handler: actor,
      type_name: type_name::<A>(),
    }
  }

  pub fn id(&self) -> &ActorId {
    self.handler.id()
  }

  pub(crate) fn downcast<A: Actor>(&self) -> Result<Arc<A>> {
    Arc::clone(&self.object).downcast().map_err(|_| Error::ResolveFailedToMatchActorType {
      found: self.type_name.to_owned(),
      expected: type_name::<A>().to_owned(),
    })
  }

  pub(crate) async fn handle(&self, request: RequestContext) -> Result<Vec<u8>> {
    self.handler.handle(request).await
  }
}

impl std::fmt::Debug for AnyActor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AnyActor")
      .field("id", self.id())
      .field("type_name", &self.type_name)
      .finish()
  }
}
