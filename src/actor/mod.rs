//! The actor runtime kernel: identities, the actor contract, and the
//! [`ActorSystem`] that routes invocations between nodes.

#[allow(clippy::module_inception)]
mod actor;
mod actor_id;
mod config;
mod errors;
mod system;
mod system_builder;

pub use self::actor::decode_reply;
pub use self::actor::encode_reply;
pub use self::actor::Actor;
pub use self::actor::AnyActor;
pub use self::actor::Invocation;
pub use self::actor::RequestContext;
pub use self::actor_id::ActorId;
pub use self::actor_id::NodeId;
pub use self::config::SystemConfig;
pub use self::errors::Error;
pub use self::errors::Result;
pub use self::system::ActorSystem;
pub use self::system::ResolveHandler;
pub use self::system_builder::SystemBuilder;
