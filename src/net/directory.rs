use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::actor::ActorId;
use crate::actor::Error;
use crate::actor::NodeId;
use crate::actor::Result;
use crate::net::remote_node::RemoteNode;

/// Tracks the live connection per peer node and the callers waiting for a
/// particular node to appear.
///
/// Client-only nodes are routinely reached by id rather than by address, so
/// a caller routing to a currently-absent node suspends here until the peer
/// (re)connects or the configured timeout elapses, instead of failing fast
/// on a transient disconnect.
#[derive(Debug, Default)]
pub(crate) struct RemoteNodeDirectory {
  inner: Mutex<DirectoryInner>,
}

#[derive(Debug, Default)]
struct DirectoryInner {
  nodes: HashMap<NodeId, Arc<RemoteNode>>,
  waiters: HashMap<NodeId, Vec<oneshot::Sender<Arc<RemoteNode>>>>,
}

impl RemoteNodeDirectory {
  /// Adopts `remote` as the connection for its node, evicting and closing
  /// any previous connection for the same peer, and wakes every waiter for
  /// that node id.
  pub(crate) fn opened(&self, remote: Arc<RemoteNode>) {
    let node_id = remote.node_id();
    let (evicted, waiters) = {
      let mut inner = self.inner.lock().expect("remote-node directory poisoned");
      let evicted = inner.nodes.insert(node_id, Arc::clone(&remote));
      let waiters = inner.waiters.remove(&node_id).unwrap_or_default();
      (evicted, waiters)
    };

    if let Some(old) = evicted {
      log::debug!("evicting stale connection to node `{node_id}`");
      old.close();
    }

    // Waiters are woken outside the lock.
    for waiter in waiters {
      let _ = waiter.send(Arc::clone(&remote));
    }
  }

  /// Removes the entry for `remote` if it is still the registered
  /// connection. Outstanding waiters stay queued until another connection
  /// opens or their timeout elapses.
  pub(crate) fn closing(&self, remote: &Arc<RemoteNode>) {
    let mut inner = self.inner.lock().expect("remote-node directory poisoned");
    if let Some(current) = inner.nodes.get(&remote.node_id()) {
      if Arc::ptr_eq(current, remote) {
        inner.nodes.remove(&remote.node_id());
      }
    }
  }

  /// Resolves the connection for the actor's home node, suspending up to
  /// `timeout` when the node is not currently connected.
  pub(crate) async fn remote_node(&self, id: &ActorId, timeout: Duration) -> Result<Arc<RemoteNode>> {
    let node_id = id.node().ok_or_else(|| Error::MissingNodeId(id.clone()))?;

    let waiter = {
      let mut inner = self.inner.lock().expect("remote-node directory poisoned");
      if let Some(remote) = inner.nodes.get(&node_id) {
        return Ok(Arc::clone(remote));
      }
      let (sender, receiver) = oneshot::channel();
      let waiters = inner.waiters.entry(node_id).or_default();
      waiters.retain(|waiter| !waiter.is_closed());
      waiters.push(sender);
      receiver
    };

    match tokio::time::timeout(timeout, waiter).await {
      Ok(Ok(remote)) => Ok(remote),
      Ok(Err(_)) | Err(_) => Err(Error::TimeoutWaitingForNodeId { node_id, timeout }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_missing_node_id_fails_immediately() {
    let directory = RemoteNodeDirectory::default();

    let result = directory
      .remote_node(&ActorId::new("untethered"), Duration::from_millis(10))
      .await;

    assert!(matches!(result, Err(Error::MissingNodeId(_))));
  }

  #[tokio::test]
  async fn test_waiter_times_out_for_absent_node() {
    let directory = RemoteNodeDirectory::default();
    let id = ActorId::random().with_node(NodeId::random());

    let started = tokio::time::Instant::now();
    let result = directory.remote_node(&id, Duration::from_millis(50)).await;

    assert!(matches!(result, Err(Error::TimeoutWaitingForNodeId { .. })));
    assert!(started.elapsed() >= Duration::from_millis(50));
  }

  #[tokio::test]
  async fn test_waiter_wakes_when_node_opens() {
    let directory = Arc::new(RemoteNodeDirectory::default());
    let node_id = NodeId::random();
    let id = ActorId::random().with_node(node_id);

    let waiting = {
      let directory = Arc::clone(&directory);
      tokio::spawn(async move { directory.remote_node(&id, Duration::from_secs(5)).await })
    };
    tokio::task::yield_now().await;

    let remote = RemoteNode::detached(node_id);
    directory.opened(Arc::clone(&remote));

    let resolved = waiting.await.unwrap().unwrap();
    assert_eq!(resolved.node_id(), node_id);
  }

  #[tokio::test]
  async fn test_adopting_a_new_connection_evicts_the_old_one() {
    let directory = RemoteNodeDirectory::default();
    let node_id = NodeId::random();

    let first = RemoteNode::detached(node_id);
    let second = RemoteNode::detached(node_id);
    directory.opened(Arc::clone(&first));
    directory.opened(Arc::clone(&second));

    assert!(first.is_closed());
    assert!(!second.is_closed());

    // A stale close must not unregister the adopted connection.
    directory.closing(&first);
    let id = ActorId::random().with_node(node_id);
    let current = directory.remote_node(&id, Duration::from_millis(10)).await.unwrap();
    assert!(Arc::ptr_eq(&current, &second));
  }
}
