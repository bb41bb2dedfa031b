use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use futures::future;

use crate::actor::Actor;
use crate::actor::ActorId;
use crate::actor::AnyActor;
use crate::actor::Error;
use crate::actor::Invocation;
use crate::actor::NodeId;
use crate::actor::RequestContext;
use crate::actor::Result;
use crate::actor::SystemConfig;
use crate::net::address::ServerAddress;
use crate::net::client::ClientManager;
use crate::net::client::ClientMonitor;
use crate::net::directory::RemoteNodeDirectory;
use crate::net::message::Blob;
use crate::net::message::CallId;
use crate::net::message::Envelope;
use crate::net::pending::PendingReplies;
use crate::net::remote_node::current_remote_node;
use crate::net::remote_node::RemoteNode;
use crate::net::server::ServerManager;
use crate::net::Manager;

tokio::task_local! {
  /// The id a factory running under [`ActorSystem::make_local_actor`] must
  /// adopt. Consulted by [`ActorSystem::assign_id`].
  static ID_HINT: ActorId;
}

/// Application fallback mapping an unknown [`ActorId`] to a newly
/// instantiated local actor, e.g. for server-side lazy construction.
pub type ResolveHandler = dyn Fn(&ActorId, &ActorSystem) -> Option<AnyActor> + Send + Sync;

/// The actor-system kernel.
///
/// Owns the directory of local actors, the pending-reply registry, the set
/// of connection managers, and the optional on-demand resolver. The system
/// is a frontend over shared state and can be cloned cheaply; clones
/// address the same kernel.
#[derive(Clone)]
pub struct ActorSystem {
  state: Arc<SystemState>,
}

struct SystemState {
  node_id: NodeId,
  config: SystemConfig,
  // Local actor directory and on-demand resolver share one lock; the
  // resolver itself is always invoked with the lock released so it may
  // re-enter `actor_ready`.
  registry: Mutex<LocalRegistry>,
  // Serializes on-demand resolver invocations; see `resolve_any`.
  resolving: Mutex<()>,
  pending: PendingReplies,
  remote_nodes: RemoteNodeDirectory,
  managers: Mutex<Vec<Arc<dyn Manager>>>,
}

#[derive(Default)]
struct LocalRegistry {
  actors: HashMap<ActorId, AnyActor>,
  resolver: Option<Arc<ResolveHandler>>,
}

impl ActorSystem {
  pub(crate) fn with_config(config: SystemConfig) -> ActorSystem {
    ActorSystem {
      state: Arc::new(SystemState {
        node_id: NodeId::random(),
        config,
        registry: Mutex::new(LocalRegistry::default()),
        resolving: Mutex::new(()),
        pending: PendingReplies::default(),
        remote_nodes: RemoteNodeDirectory::default(),
        managers: Mutex::new(Vec::new()),
      }),
    }
  }

  /// A system with the default configuration.
  pub fn new() -> ActorSystem {
    ActorSystem::with_config(SystemConfig::default())
  }

  /// The identity of this node, minted at construction.
  pub fn node_id(&self) -> NodeId {
    self.state.node_id
  }

  pub(crate) fn config(&self) -> &SystemConfig {
    &self.state.config
  }

  pub(crate) fn directory(&self) -> &RemoteNodeDirectory {
    &self.state.remote_nodes
  }

  pub(crate) fn pending(&self) -> &PendingReplies {
    &self.state.pending
  }

  fn registry(&self) -> MutexGuard<'_, LocalRegistry> {
    self.state.registry.lock().expect("local actor registry poisoned")
  }

  /// Assigns the id a new actor of type `A` registers under.
  ///
  /// A task-local hint installed by [`ActorSystem::make_local_actor`] is
  /// used verbatim; without one a random typed id stamped with the local
  /// node is minted.
  ///
  /// # Panics
  ///
  /// Panics when the hint names an id that is already registered. Reusing
  /// an id risks misrouting every message addressed to it, which cannot be
  /// recovered from.
  pub fn assign_id<A: Actor>(&self) -> ActorId {
    match ID_HINT.try_with(|hint| hint.clone()) {
      Ok(hint) => {
        if self.registry().actors.contains_key(&hint) {
          panic!("actor id `{hint}` is already registered on this node");
        }
        hint
      }
      Err(_) => ActorId::random_for::<A>().with_node(self.node_id()),
    }
  }

  /// Inserts a constructed actor into the local directory and returns the
  /// registered instance.
  ///
  /// Two resolves racing through the on-demand resolver may both construct
  /// an actor for the same id; the first registration wins and a duplicate
  /// of the same type is discarded in its favor, so racing callers converge
  /// on one instance.
  ///
  /// # Panics
  ///
  /// Panics when the id is already registered to an actor of a different
  /// type. That is not a race but a duplicate assignment, which risks
  /// misrouting every message addressed to the id.
  pub fn actor_ready<A: Actor>(&self, actor: Arc<A>) -> Arc<A> {
    let entry = AnyActor::new(Arc::clone(&actor));
    let id = entry.id().clone();
    let mut registry = self.registry();
    match registry.actors.entry(id) {
      Entry::Vacant(slot) => {
        slot.insert(entry);
        actor
      }
      Entry::Occupied(slot) => match slot.get().downcast::<A>() {
        Ok(winner) => winner,
        Err(_) => panic!("actor id `{}` is already registered on this node", slot.key()),
      },
    }
  }

  /// Removes `id` from the local directory. Inbound calls that resolve
  /// after this point are dropped.
  pub fn resign_id(&self, id: &ActorId) {
    self.registry().actors.remove(id);
  }

  /// Creates a local actor through `factory`, registering it under `id`
  /// when given (stamped with the local node) or under a fresh typed id.
  ///
  /// The assigned id is visible to [`ActorSystem::assign_id`] as a
  /// task-local hint for the duration of the factory and is also passed to
  /// the factory directly.
  pub fn make_local_actor<A, F>(&self, id: Option<ActorId>, factory: F) -> Arc<A>
  where
    A: Actor,
    F: FnOnce(ActorId) -> A,
  {
    let hint = id.unwrap_or_else(ActorId::random_for::<A>).with_node(self.node_id());
    let actor = ID_HINT.sync_scope(hint, || {
      let assigned = self.assign_id::<A>();
      Arc::new(factory(assigned))
    });
    self.actor_ready(actor)
  }

  /// Installs the on-demand resolve fallback.
  pub fn register_resolve_handler<F>(&self, handler: F)
  where
    F: Fn(&ActorId, &ActorSystem) -> Option<AnyActor> + Send + Sync + 'static,
  {
    self.registry().resolver = Some(Arc::new(handler));
  }

  /// Resolves `id` to a local actor of type `A`.
  ///
  /// Returns `Ok(None)` when the id is not hosted here, in which case the
  /// caller should treat it as remote. A type mismatch, in the directory or
  /// from the resolver, fails with
  /// [`Error::ResolveFailedToMatchActorType`].
  pub fn resolve<A: Actor>(&self, id: &ActorId) -> Result<Option<Arc<A>>> {
    match self.resolve_any(id)? {
      Some(entry) => entry.downcast::<A>().map(Some),
      None => Ok(None),
    }
  }

  pub(crate) fn resolve_any(&self, id: &ActorId) -> Result<Option<AnyActor>> {
    let resolver = {
      let registry = self.registry();
      if let Some(entry) = registry.actors.get(id) {
        return Ok(Some(entry.clone()));
      }
      registry.resolver.clone()
    };

    // The resolver runs outside the registry lock, so constructing the
    // actor may re-enter `actor_ready`. It runs under its own lock: two
    // racing resolves for the same unregistered id would otherwise both
    // construct the actor, and the loser would trip the
    // duplicate-assignment halt.
    if let Some(resolver) = resolver {
      let _resolving = self.state.resolving.lock().expect("resolver serialization poisoned");
      if let Some(registered) = self.registry().actors.get(id) {
        // A resolve that held the lock first already registered this id.
        return Ok(Some(registered.clone()));
      }
      if let Some(entry) = resolver(id, self) {
        if entry.id().node() != Some(self.node_id()) {
          // An actor homed elsewhere must not be adopted locally; routing
          // to it would loop.
          return Err(Error::ResolveFailed(id.clone()));
        }
        return Ok(Some(entry));
      }
    }

    Ok(None)
  }

  /// Invokes `invocation` on the actor identified by `recipient` and
  /// returns the raw reply value; decode it with
  /// [`decode_reply`](crate::actor::decode_reply).
  ///
  /// A recipient homed on this node dispatches through the local
  /// directory. A remote recipient is routed over the connection to its
  /// node, waiting up to the configured connection timeout for that node
  /// to appear.
  pub async fn remote_call(&self, recipient: &ActorId, invocation: Invocation) -> Result<Vec<u8>> {
    match recipient.node() {
      Some(node) if node == self.node_id() => self.invoke_local(recipient, invocation).await,
      Some(_) => self.invoke_remote(recipient, invocation).await,
      None => {
        // A node-less id can only name a local actor.
        if self.resolve_any(recipient)?.is_some() {
          self.invoke_local(recipient, invocation).await
        } else {
          Err(Error::MissingNodeId(recipient.clone()))
        }
      }
    }
  }

  /// Like [`ActorSystem::remote_call`], discarding the reply value.
  pub async fn remote_call_void(&self, recipient: &ActorId, invocation: Invocation) -> Result<()> {
    self.remote_call(recipient, invocation).await.map(drop)
  }

  async fn invoke_local(&self, recipient: &ActorId, invocation: Invocation) -> Result<Vec<u8>> {
    let actor = self
      .resolve_any(recipient)?
      .ok_or_else(|| Error::ResolveFailed(recipient.clone()))?;
    let request = RequestContext::new(invocation, self.node_id());
    actor.handle(request).await
  }

  async fn invoke_remote(&self, recipient: &ActorId, invocation: Invocation) -> Result<Vec<u8>> {
    let remote = self
      .state
      .remote_nodes
      .remote_node(recipient, self.state.config.connection_timeout)
      .await?;

    let (invocation_target, generic_subs, args) = invocation.into_parts();
    let recipient = recipient.clone();
    self
      .state
      .pending
      .send_message(|call_id| {
        let remote = Arc::clone(&remote);
        async move {
          remote.track_call(call_id);
          let envelope = Envelope::Call {
            call_id,
            recipient,
            invocation_target,
            generic_subs,
            args: args.into_iter().map(Blob).collect(),
          };
          match remote.write(envelope).await {
            Ok(()) => Ok(()),
            Err(err) => {
              remote.forget_call(&call_id);
              Err(err)
            }
          }
        }
      })
      .await
  }

  /// Handles one inbound `Call` envelope on behalf of `remote`.
  ///
  /// An unresolvable recipient is logged and dropped without a reply; the
  /// caller's own timeout surfaces it. Handler errors are replied to with
  /// an empty value so no diagnostic detail crosses the wire.
  pub(crate) async fn dispatch_inbound(
    &self,
    call_id: CallId,
    recipient: ActorId,
    invocation: Invocation,
    remote: Arc<RemoteNode>,
  ) {
    let actor = match self.resolve_any(&recipient) {
      Ok(Some(actor)) => actor,
      Ok(None) => {
        log::warn!("dropping call `{call_id}` to unknown actor `{recipient}`");
        return;
      }
      Err(err) => {
        log::warn!("dropping call `{call_id}` to actor `{recipient}`: {err}");
        return;
      }
    };

    let request = RequestContext::new(invocation, remote.node_id());
    let value = match actor.handle(request).await {
      Ok(value) => value,
      Err(err) => {
        log::debug!("handler for call `{call_id}` on `{recipient}` failed: {err}");
        Vec::new()
      }
    };

    let reply = Envelope::Reply {
      call_id,
      sender: Some(recipient),
      value: Blob(value),
    };
    if let Err(err) = remote.write(reply).await {
      log::debug!("failed to send reply for call `{call_id}`: {err}");
    }
  }

  /// Reads a value from the user-info map of the connection whose call is
  /// currently being dispatched.
  ///
  /// Fails with [`Error::NotInDistributedActor`] outside an inbound
  /// dispatch.
  pub fn get_node_info<T: Send + Sync + 'static>(&self, key: &str) -> Result<Option<Arc<T>>> {
    let remote = current_remote_node().ok_or(Error::NotInDistributedActor)?;
    Ok(remote.get_info(key).and_then(|value| value.downcast::<T>().ok()))
  }

  /// Writes a value into the user-info map of the connection whose call is
  /// currently being dispatched.
  pub fn set_node_info<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) -> Result<()> {
    let remote = current_remote_node().ok_or(Error::NotInDistributedActor)?;
    remote.set_info(key.into(), Arc::new(value) as Arc<dyn Any + Send + Sync>);
    Ok(())
  }

  /// Starts accepting peer connections at `address`. The bound address,
  /// also when binding port 0, is observable through the returned manager.
  pub async fn run_server(&self, address: ServerAddress) -> Result<Arc<ServerManager>> {
    let manager = ServerManager::bind(self.clone(), address).await?;
    self.push_manager(Arc::clone(&manager) as Arc<dyn Manager>);
    Ok(manager)
  }

  /// Starts dialing `address`, reconnecting with backoff until cancelled.
  pub fn connect_client(&self, address: ServerAddress) -> Arc<ClientManager> {
    self.connect_client_with_monitor(address, None)
  }

  /// Like [`ActorSystem::connect_client`], with a callback observing the
  /// connection-state transitions.
  pub fn connect_client_with_monitor(
    &self,
    address: ServerAddress,
    monitor: Option<ClientMonitor>,
  ) -> Arc<ClientManager> {
    let manager = ClientManager::connect(self.clone(), address, monitor);
    self.push_manager(Arc::clone(&manager) as Arc<dyn Manager>);
    manager
  }

  fn push_manager(&self, manager: Arc<dyn Manager>) {
    self
      .state
      .managers
      .lock()
      .expect("manager list poisoned")
      .push(manager);
  }

  /// Cancels every manager in parallel and waits for all of them to
  /// terminate, then fails whatever calls are still outstanding.
  pub async fn shutdown_gracefully(&self) {
    let managers: Vec<Arc<dyn Manager>> = {
      let mut managers = self.state.managers.lock().expect("manager list poisoned");
      managers.drain(..).collect()
    };

    future::join_all(managers.iter().map(|manager| manager.cancel())).await;
    self.state.pending.fail_all(|| Error::Shutdown);
  }
}

impl Default for ActorSystem {
  fn default() -> Self {
    ActorSystem::new()
  }
}
