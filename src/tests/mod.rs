mod person;
mod remote;

use std::sync::Arc;
use std::time::Duration;

use crate::actor::ActorSystem;
use crate::actor::SystemBuilder;
use crate::ServerAddress;
use crate::ServerManager;

fn try_init_logger() {
  let _ = pretty_env_logger::try_init();
}

/// A server-only system listening on an ephemeral localhost port.
async fn default_server_system() -> (ActorSystem, Arc<ServerManager>) {
  let system = SystemBuilder::new().build();
  let manager = system
    .run_server(ServerAddress::insecure("127.0.0.1", 0))
    .await
    .unwrap();
  (system, manager)
}

/// A client system dialing `port` on localhost with snappy reconnects.
fn default_client_system(port: u16) -> ActorSystem {
  let system = SystemBuilder::new()
    .connection_timeout(Duration::from_secs(5))
    .reconnect_delays(Duration::from_millis(50), Duration::from_millis(200))
    .build();
  let _ = system.connect_client(ServerAddress::insecure("127.0.0.1", port));
  system
}

/// Polls `condition` until it holds or `timeout` elapses.
async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
  let deadline = tokio::time::Instant::now() + timeout;
  while tokio::time::Instant::now() < deadline {
    if condition() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  condition()
}
