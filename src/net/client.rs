use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actor::ActorSystem;
use crate::actor::SystemConfig;
use crate::net::address::ServerAddress;
use crate::net::handshake;
use crate::net::remote_node;
use crate::net::Manager;

/// Connection-lifecycle transitions observable through a client monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
  Connecting,
  Connected,
  Disconnected,
  Reconnecting,
  Cancelled,
}

/// User-supplied callback observing [`ClientStatus`] transitions.
pub type ClientMonitor = Arc<dyn Fn(ClientStatus) + Send + Sync>;

/// Dials a server and keeps the connection alive.
///
/// The manager supervises a resilient task: dial, handshake, run the read
/// loop, and on any failure or clean close reconnect after an exponential
/// backoff with jitter. Cancellation tears the loop down cooperatively; an
/// in-flight dial or read observes it within bounded time.
pub struct ClientManager {
  address: ServerAddress,
  cancel: CancellationToken,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientManager {
  pub(crate) fn connect(system: ActorSystem, address: ServerAddress, monitor: Option<ClientMonitor>) -> Arc<ClientManager> {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(resilient_loop(system, address.clone(), monitor, cancel.clone()));

    Arc::new(ClientManager {
      address,
      cancel,
      task: Mutex::new(Some(task)),
    })
  }

  /// The address this manager dials.
  pub fn address(&self) -> &ServerAddress {
    &self.address
  }
}

#[async_trait]
impl Manager for ClientManager {
  async fn cancel(&self) {
    self.cancel.cancel();
    let task = self.task.lock().expect("client manager task slot poisoned").take();
    if let Some(task) = task {
      let _ = task.await;
    }
  }
}

async fn resilient_loop(
  system: ActorSystem,
  address: ServerAddress,
  monitor: Option<ClientMonitor>,
  cancel: CancellationToken,
) {
  let mut backoff = Backoff::new(system.config());
  let mut first_attempt = true;
  let url = address.ws_url();

  loop {
    observe(&monitor, if first_attempt { ClientStatus::Connecting } else { ClientStatus::Reconnecting });
    first_attempt = false;

    let dialed = tokio::select! {
      _ = cancel.cancelled() => break,
      dialed = tokio_tungstenite::connect_async(url.as_str()) => dialed,
    };

    match dialed {
      Ok((mut socket, _response)) => {
        let handshaken = tokio::select! {
          _ = cancel.cancelled() => break,
          peer_id = handshake::exchange_node_ids(&mut socket, system.node_id()) => peer_id,
        };
        match handshaken {
          Ok(peer_id) => {
            log::debug!("connected to node `{peer_id}` at {url}");
            backoff.reset();
            observe(&monitor, ClientStatus::Connected);

            remote_node::run(system.clone(), socket, peer_id, cancel.child_token()).await;
            if cancel.is_cancelled() {
              break;
            }
            observe(&monitor, ClientStatus::Disconnected);
          }
          Err(err) => {
            log::debug!("handshake with {url} failed: {err}");
          }
        }
      }
      Err(err) => {
        log::debug!("failed to connect to {url}: {err}");
      }
    }

    let delay = backoff.next_delay();
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = tokio::time::sleep(delay) => {}
    }
  }

  observe(&monitor, ClientStatus::Cancelled);
}

fn observe(monitor: &Option<ClientMonitor>, status: ClientStatus) {
  if let Some(monitor) = monitor {
    monitor(status);
  }
}

/// Monotonic exponential backoff with jitter, capped at the configured
/// maximum.
struct Backoff {
  initial: Duration,
  max: Duration,
  next: Duration,
}

impl Backoff {
  fn new(config: &SystemConfig) -> Backoff {
    Backoff {
      initial: config.reconnect_initial_delay,
      max: config.reconnect_max_delay,
      next: config.reconnect_initial_delay,
    }
  }

  fn reset(&mut self) {
    self.next = self.initial;
  }

  fn next_delay(&mut self) -> Duration {
    let base = self.next;
    self.next = (base * 2).min(self.max);
    base + base.mul_f64(rand::thread_rng().gen_range(0.0..0.5))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_backoff_grows_monotonically_to_the_cap() {
    let config = SystemConfig::default();
    let mut backoff = Backoff::new(&config);

    let mut previous = Duration::ZERO;
    for _ in 0..16 {
      let delay = backoff.next_delay();
      assert!(delay >= previous.min(config.reconnect_max_delay));
      assert!(delay <= config.reconnect_max_delay + config.reconnect_max_delay / 2);
      previous = delay;
    }

    backoff.reset();
    assert!(backoff.next_delay() < config.reconnect_initial_delay * 2);
  }
}
