use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::DashSet;
use futures::stream::SplitSink;
use futures::stream::SplitStream;
use futures::SinkExt;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::actor::ActorSystem;
use crate::actor::Error;
use crate::actor::Invocation;
use crate::actor::NodeId;
use crate::actor::Result;
use crate::net::message::CallId;
use crate::net::message::Envelope;
use crate::net::pending::PendingReplies;

tokio::task_local! {
  /// The connection whose inbound call is currently being dispatched.
  /// Installed around each dispatch so user code can reach the per-peer
  /// user-info map; never stored globally.
  pub(crate) static CURRENT_REMOTE_NODE: Arc<RemoteNode>;
}

/// Returns the connection dispatching the current inbound call, if any.
pub(crate) fn current_remote_node() -> Option<Arc<RemoteNode>> {
  CURRENT_REMOTE_NODE.try_with(Arc::clone).ok()
}

const OUTBOUND_BUFFER: usize = 64;

/// Frames travelling to the single writer task of a connection.
#[derive(Debug)]
enum OutboundFrame {
  Envelope(Envelope),
  Pong(Vec<u8>),
  CloseEcho(Option<CloseFrame<'static>>),
}

/// The runtime object bound to one live peer connection.
///
/// All sends are serialized through one writer task that exclusively owns
/// the socket's write half; one reader task consumes the inbound frames.
/// The user-info map carries opaque per-peer state for application code.
pub(crate) struct RemoteNode {
  node_id: NodeId,
  outbound: mpsc::Sender<OutboundFrame>,
  info: DashMap<String, Arc<dyn Any + Send + Sync>>,
  in_flight: DashSet<CallId>,
  cancel: CancellationToken,
}

impl std::fmt::Debug for RemoteNode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RemoteNode").field("node_id", &self.node_id).finish()
  }
}

impl RemoteNode {
  fn new(node_id: NodeId, outbound: mpsc::Sender<OutboundFrame>, cancel: CancellationToken) -> Arc<RemoteNode> {
    Arc::new(RemoteNode {
      node_id,
      outbound,
      info: DashMap::new(),
      in_flight: DashSet::new(),
      cancel,
    })
  }

  /// A remote node without a live socket behind it, for directory tests.
  #[cfg(test)]
  pub(crate) fn detached(node_id: NodeId) -> Arc<RemoteNode> {
    let (outbound, _receiver) = mpsc::channel(1);
    RemoteNode::new(node_id, outbound, CancellationToken::new())
  }

  pub(crate) fn node_id(&self) -> NodeId {
    self.node_id
  }

  /// Enqueues an envelope for the writer task. Suspends when the channel is
  /// full; the write-side flow control of the socket is the backpressure.
  ///
  /// A cancelled connection refuses new envelopes: anything enqueued after
  /// the in-flight sweep would never resolve.
  pub(crate) async fn write(&self, envelope: Envelope) -> Result<()> {
    if self.cancel.is_cancelled() {
      return Err(Error::ConnectionLost);
    }
    self.send(OutboundFrame::Envelope(envelope)).await
  }

  async fn send(&self, frame: OutboundFrame) -> Result<()> {
    self
      .outbound
      .send(frame)
      .await
      .map_err(|_| Error::ConnectionLost)
  }

  async fn pong(&self, payload: Vec<u8>) -> Result<()> {
    self.send(OutboundFrame::Pong(payload)).await
  }

  async fn echo_close(&self, frame: Option<CloseFrame<'static>>) -> Result<()> {
    self.send(OutboundFrame::CloseEcho(frame)).await
  }

  /// Tears the connection down cooperatively; the reader observes the
  /// cancellation and runs the regular cleanup path.
  pub(crate) fn close(&self) {
    self.cancel.cancel();
  }

  #[cfg(test)]
  pub(crate) fn is_closed(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Records an outgoing call routed through this connection so it can be
  /// failed if the connection goes away before the reply.
  pub(crate) fn track_call(&self, call_id: CallId) {
    self.in_flight.insert(call_id);
  }

  pub(crate) fn forget_call(&self, call_id: &CallId) {
    self.in_flight.remove(call_id);
  }

  fn fail_in_flight(&self, pending: &PendingReplies) {
    for call_id in self.in_flight.iter().map(|entry| *entry.key()).collect::<Vec<_>>() {
      pending.fail(call_id, Error::ConnectionLost);
    }
    self.in_flight.clear();
  }

  pub(crate) fn set_info(&self, key: String, value: Arc<dyn Any + Send + Sync>) {
    self.info.insert(key, value);
  }

  pub(crate) fn get_info(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
    self.info.get(key).map(|entry| Arc::clone(entry.value()))
  }
}

/// Runs one established connection until it closes.
///
/// Splits the socket, spawns the writer task, registers the connection in
/// the remote-node directory, and consumes inbound frames in the calling
/// task. On exit the connection is unregistered and every call still routed
/// through it fails with [`Error::ConnectionLost`].
pub(crate) async fn run<S>(system: ActorSystem, socket: WebSocketStream<S>, peer_id: NodeId, cancel: CancellationToken)
where
  S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
  let (sink, stream) = socket.split();
  let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
  let remote = RemoteNode::new(peer_id, outbound, cancel);

  let writer = tokio::spawn(write_loop(sink, outbound_rx, remote.cancel.clone(), peer_id));

  system.directory().opened(Arc::clone(&remote));
  read_loop(&system, &remote, stream).await;
  system.directory().closing(&remote);

  // The sweep must run after the writer stopped accepting frames: a caller
  // holding this node from an earlier directory lookup could otherwise
  // register a call right after the sweep and hang forever.
  remote.close();
  let _ = writer.await;
  remote.fail_in_flight(system.pending());

  log::debug!("connection to node `{peer_id}` closed");
}

async fn write_loop<S>(
  mut sink: SplitSink<WebSocketStream<S>, Message>,
  mut outbound: mpsc::Receiver<OutboundFrame>,
  cancel: CancellationToken,
  peer_id: NodeId,
) where
  S: AsyncRead + AsyncWrite + Unpin,
{
  loop {
    // Dispatch tasks may outlive the connection while holding the sender
    // half, so the writer watches the cancellation too; queued frames are
    // drained first.
    let frame = tokio::select! {
      biased;
      frame = outbound.recv() => match frame {
        Some(frame) => frame,
        None => break,
      },
      _ = cancel.cancelled() => break,
    };

    let message = match frame {
      OutboundFrame::Envelope(Envelope::ConnectionClose) => Message::Close(Some(CloseFrame {
        code: CloseCode::Protocol,
        reason: "connection close".into(),
      })),
      OutboundFrame::Envelope(envelope) => match envelope.to_text() {
        Ok(text) => Message::Text(text),
        Err(err) => {
          // Callers observe the lost frame through their own timeouts.
          log::error!("failed to encode envelope for node `{peer_id}`: {err}");
          continue;
        }
      },
      OutboundFrame::Pong(payload) => Message::Pong(payload),
      OutboundFrame::CloseEcho(frame) => Message::Close(frame),
    };

    let closing = matches!(message, Message::Close(_));
    if let Err(err) = sink.send(message).await {
      log::debug!("failed to write frame to node `{peer_id}`: {err}");
      break;
    }
    if closing {
      break;
    }
  }

  let _ = sink.close().await;
}

async fn read_loop<S>(system: &ActorSystem, remote: &Arc<RemoteNode>, mut stream: SplitStream<WebSocketStream<S>>)
where
  S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
  loop {
    let message = tokio::select! {
      _ = remote.cancel.cancelled() => {
        // Past `write`'s cancellation check on purpose: the close marker
        // must still reach the peer.
        let _ = remote.send(OutboundFrame::Envelope(Envelope::ConnectionClose)).await;
        return;
      }
      message = stream.next() => message,
    };

    match message {
      None => return,
      Some(Err(err)) => {
        log::debug!("read error from node `{}`: {err}", remote.node_id());
        return;
      }
      Some(Ok(Message::Text(text))) => match Envelope::from_text(&text) {
        Ok(envelope) => {
          if !handle_envelope(system, remote, envelope).await {
            return;
          }
        }
        Err(err) => {
          log::warn!("malformed envelope from node `{}`: {err}", remote.node_id());
          let _ = remote.write(Envelope::ConnectionClose).await;
          return;
        }
      },
      Some(Ok(Message::Close(frame))) => {
        let _ = remote.echo_close(frame).await;
        return;
      }
      Some(Ok(Message::Ping(payload))) => {
        if remote.pong(payload).await.is_err() {
          return;
        }
      }
      Some(Ok(Message::Pong(_))) => {}
      Some(Ok(Message::Binary(_))) => {}
      Some(Ok(Message::Frame(_))) => {}
    }
  }
}

/// Returns whether the connection should keep running.
async fn handle_envelope(system: &ActorSystem, remote: &Arc<RemoteNode>, envelope: Envelope) -> bool {
  match envelope {
    Envelope::Call {
      call_id,
      recipient,
      invocation_target,
      generic_subs,
      args,
    } => {
      let invocation = Invocation::from_parts(
        invocation_target,
        generic_subs,
        args.into_iter().map(|blob| blob.0).collect(),
      );
      let system = system.clone();
      let remote = Arc::clone(remote);
      // Each inbound call runs in its own task; the kernel does not
      // serialize calls per actor.
      tokio::spawn(CURRENT_REMOTE_NODE.scope(Arc::clone(&remote), async move {
        system.dispatch_inbound(call_id, recipient, invocation, remote).await;
      }));
      true
    }
    Envelope::Reply { call_id, value, .. } => {
      remote.forget_call(&call_id);
      if let Err(err) = system.pending().received_reply(call_id, value.0) {
        log::debug!("dropping late reply from node `{}`: {err}", remote.node_id());
      }
      true
    }
    Envelope::ConnectionClose => {
      let _ = remote.echo_close(None).await;
      false
    }
  }
}
