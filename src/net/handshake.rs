use futures::SinkExt;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::actor::Error;
use crate::actor::NodeId;
use crate::actor::Result;

/// Exchanges node ids immediately after the WebSocket upgrade.
///
/// Each side transmits its own [`NodeId`] as the first application message
/// and reads the peer's before any `Call` or `Reply` is admitted. A
/// malformed handshake aborts the connection with
/// [`Error::FailedToUpgrade`].
pub(crate) async fn exchange_node_ids<S>(socket: &mut WebSocketStream<S>, local: NodeId) -> Result<NodeId>
where
  S: AsyncRead + AsyncWrite + Unpin,
{
  let hello = serde_json::to_string(&local).map_err(|err| Error::FailedToUpgrade(err.to_string()))?;
  socket
    .send(Message::Text(hello))
    .await
    .map_err(|err| Error::FailedToUpgrade(err.to_string()))?;

  while let Some(message) = socket.next().await {
    match message.map_err(|err| Error::FailedToUpgrade(err.to_string()))? {
      Message::Text(text) => {
        return serde_json::from_str(&text).map_err(|err| Error::FailedToUpgrade(err.to_string()));
      }
      // Transport control frames may precede the first application message.
      Message::Ping(_) | Message::Pong(_) => continue,
      other => {
        return Err(Error::FailedToUpgrade(format!(
          "expected a node id as the first message, got {other:?}"
        )));
      }
    }
  }

  Err(Error::FailedToUpgrade("connection closed during node-id exchange".to_owned()))
}
