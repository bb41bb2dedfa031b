use std::fmt::Display;
use std::fmt::Formatter;

use serde::Deserialize;
use serde::Serialize;

/// Whether a connection is dialed in the clear or through TLS.
///
/// Servers only bind insecure listeners; secure deployments terminate TLS
/// in an external reverse proxy. Clients pass `Secure` straight through to
/// the transport as a `wss://` dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressScheme {
  Insecure,
  Secure,
}

/// The address of a listening node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddress {
  pub scheme: AddressScheme,
  pub host: String,
  pub port: u16,
}

impl ServerAddress {
  /// A plaintext address.
  pub fn insecure(host: impl Into<String>, port: u16) -> ServerAddress {
    ServerAddress {
      scheme: AddressScheme::Insecure,
      host: host.into(),
      port,
    }
  }

  /// A TLS address, dialable by clients only.
  pub fn secure(host: impl Into<String>, port: u16) -> ServerAddress {
    ServerAddress {
      scheme: AddressScheme::Secure,
      host: host.into(),
      port,
    }
  }

  /// The URL this address dials to.
  pub(crate) fn ws_url(&self) -> String {
    match self.scheme {
      AddressScheme::Insecure => format!("ws://{}:{}", self.host, self.port),
      AddressScheme::Secure => format!("wss://{}:{}", self.host, self.port),
    }
  }
}

impl Display for ServerAddress {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.ws_url())
  }
}
