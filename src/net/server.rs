use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::net::TcpSocket;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::actor::ActorSystem;
use crate::actor::Error;
use crate::actor::Result;
use crate::net::address::AddressScheme;
use crate::net::address::ServerAddress;
use crate::net::handshake;
use crate::net::remote_node;
use crate::net::Manager;

/// Accepts inbound peer connections on a bound port.
///
/// Every accepted connection goes through the WebSocket upgrade and the
/// node-id handshake before its remote node is admitted to the directory.
/// Binding port 0 is allowed; the actual port is observable through
/// [`ServerManager::local_addr`] once this manager exists.
pub struct ServerManager {
  local_addr: SocketAddr,
  cancel: CancellationToken,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl ServerManager {
  pub(crate) async fn bind(system: ActorSystem, address: ServerAddress) -> Result<Arc<ServerManager>> {
    if address.scheme == AddressScheme::Secure {
      return Err(Error::SecureServerNotSupported);
    }

    let listener = bind_listener(&address).await?;
    let local_addr = listener.local_addr()?;
    let cancel = CancellationToken::new();

    let task = tokio::spawn(accept_loop(system, listener, cancel.clone()));
    log::info!("listening on {local_addr}");

    Ok(Arc::new(ServerManager {
      local_addr,
      cancel,
      task: Mutex::new(Some(task)),
    }))
  }

  /// The address this manager is bound to.
  pub fn local_addr(&self) -> SocketAddr {
    self.local_addr
  }
}

#[async_trait]
impl Manager for ServerManager {
  async fn cancel(&self) {
    self.cancel.cancel();
    let task = self.task.lock().expect("server manager task slot poisoned").take();
    if let Some(task) = task {
      let _ = task.await;
    }
  }
}

/// Binds with `SO_REUSEADDR` so a cycled server can re-acquire its port
/// while old connections linger in TIME_WAIT.
async fn bind_listener(address: &ServerAddress) -> Result<TcpListener> {
  let mut addrs = tokio::net::lookup_host((address.host.as_str(), address.port)).await?;
  let addr = addrs
    .next()
    .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, format!("cannot resolve {}", address.host)))?;

  let socket = match addr {
    SocketAddr::V4(_) => TcpSocket::new_v4()?,
    SocketAddr::V6(_) => TcpSocket::new_v6()?,
  };
  socket.set_reuseaddr(true)?;
  socket.bind(addr)?;
  Ok(socket.listen(1024)?)
}

async fn accept_loop(system: ActorSystem, listener: TcpListener, cancel: CancellationToken) {
  let mut connections: JoinSet<()> = JoinSet::new();

  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      accepted = listener.accept() => match accepted {
        Ok((stream, peer_addr)) => {
          let system = system.clone();
          let cancel = cancel.child_token();
          connections.spawn(async move {
            if let Err(err) = serve_connection(system, stream, cancel).await {
              log::debug!("connection from {peer_addr} ended: {err}");
            }
          });
        }
        Err(err) => {
          log::warn!("failed to accept connection: {err}");
        }
      }
    }
  }

  // Children observe the cancellation through their tokens; wait for each
  // to finish its cleanup.
  while connections.join_next().await.is_some() {}
}

async fn serve_connection(system: ActorSystem, stream: TcpStream, cancel: CancellationToken) -> Result<()> {
  let mut socket = tokio_tungstenite::accept_async(stream)
    .await
    .map_err(|err| Error::FailedToUpgrade(err.to_string()))?;

  let peer_id = handshake::exchange_node_ids(&mut socket, system.node_id()).await?;
  log::debug!("accepted connection from node `{peer_id}`");

  remote_node::run(system, socket, peer_id, cancel).await;
  Ok(())
}
