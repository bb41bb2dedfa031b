use std::future::Future;

use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::actor::Error;
use crate::actor::Result;
use crate::net::message::CallId;

type Completer = oneshot::Sender<Result<Vec<u8>>>;

/// Correlates outgoing call ids with the callers awaiting their replies.
///
/// Every outgoing `Call` holds exactly one completer here until the matching
/// `Reply` arrives, the connection carrying it is lost, or the caller
/// cancels. Completers are one-shot and may resolve in any order.
#[derive(Debug, Default)]
pub(crate) struct PendingReplies {
  completers: DashMap<CallId, Completer>,
}

impl PendingReplies {
  /// Mints a fresh call id, installs a completer for it, runs `send` with
  /// the id, and awaits the reply bytes.
  ///
  /// If `send` fails the completer is withdrawn and the error re-raised.
  /// Dropping the returned future withdraws the completer as well, so a
  /// late reply surfaces as [`Error::MissingReplyContinuation`] at the
  /// dispatch site instead of resolving into nothing.
  pub(crate) async fn send_message<F, Fut>(&self, send: F) -> Result<Vec<u8>>
  where
    F: FnOnce(CallId) -> Fut,
    Fut: Future<Output = Result<()>>,
  {
    let call_id: CallId = Uuid::new_v4();
    let (completer, resolution) = oneshot::channel();
    self.completers.insert(call_id, completer);
    let _guard = CompleterGuard {
      completers: &self.completers,
      call_id,
    };

    send(call_id).await?;

    match resolution.await {
      Ok(outcome) => outcome,
      // The completer was dropped without resolving, which only happens
      // when the registry itself goes away mid-call.
      Err(_) => Err(Error::ConnectionLost),
    }
  }

  /// Resolves the completer for `call_id` with the reply bytes.
  pub(crate) fn received_reply(&self, call_id: CallId, value: Vec<u8>) -> Result<()> {
    match self.completers.remove(&call_id) {
      Some((_, completer)) => {
        // A send failure means the caller went away between the reply
        // arriving and this resolution; nothing is awaiting anymore.
        let _ = completer.send(Ok(value));
        Ok(())
      }
      None => Err(Error::MissingReplyContinuation(call_id)),
    }
  }

  /// Resolves the completer for `call_id` with `error`, if one is present.
  pub(crate) fn fail(&self, call_id: CallId, error: Error) {
    if let Some((_, completer)) = self.completers.remove(&call_id) {
      let _ = completer.send(Err(error));
    }
  }

  /// Resolves every outstanding completer with an error.
  pub(crate) fn fail_all(&self, make_error: impl Fn() -> Error) {
    let call_ids: Vec<CallId> = self.completers.iter().map(|entry| *entry.key()).collect();
    for call_id in call_ids {
      self.fail(call_id, make_error());
    }
  }
}

/// Withdraws the completer when the caller stops awaiting, whether through
/// an early send failure or through cancellation.
struct CompleterGuard<'a> {
  completers: &'a DashMap<CallId, Completer>,
  call_id: CallId,
}

impl Drop for CompleterGuard<'_> {
  fn drop(&mut self) {
    self.completers.remove(&self.call_id);
  }
}
