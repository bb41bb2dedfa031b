use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use uuid::Uuid;

use crate::actor::ActorId;

/// A fresh 128-bit identifier minted per outgoing invocation.
pub(crate) type CallId = Uuid;

/// An opaque byte blob, carried on the wire as a base64 string.
///
/// Argument and value blobs are whatever the application's codec emits for
/// its declared types; the runtime never inspects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Blob(pub(crate) Vec<u8>);

impl Serialize for Blob {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(&self.0))
  }
}

impl<'de> Deserialize<'de> for Blob {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    BASE64
      .decode(encoded.as_bytes())
      .map(Blob)
      .map_err(de::Error::custom)
  }
}

/// The tagged wire message exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "camelCase")]
pub(crate) enum Envelope {
  /// A method invocation addressed to a remote actor. `invocation_target`
  /// is an opaque method mangling; `args` is the ordered list of encoded
  /// argument blobs.
  #[serde(rename_all = "camelCase")]
  Call {
    #[serde(rename = "callID")]
    call_id: CallId,
    recipient: ActorId,
    invocation_target: String,
    generic_subs: Vec<String>,
    args: Vec<Blob>,
  },
  /// The reply matching an outstanding call. `value` is the encoded return,
  /// empty for void returns and for handler errors.
  #[serde(rename_all = "camelCase")]
  Reply {
    #[serde(rename = "callID")]
    call_id: CallId,
    sender: Option<ActorId>,
    value: Blob,
  },
  /// Application-level close marker.
  ConnectionClose,
}

impl Envelope {
  /// Serializes the envelope into the JSON text of one frame.
  pub(crate) fn to_text(&self) -> std::io::Result<String> {
    serde_json::to_string(self).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))
  }

  /// Deserializes the JSON text of one frame into an envelope.
  pub(crate) fn from_text(text: &str) -> std::io::Result<Self> {
    serde_json::from_str(text).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))
  }
}
