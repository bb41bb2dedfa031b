use std::time::Duration;

/// Runtime tunables for an actor system.
#[derive(Debug, Clone)]
pub struct SystemConfig {
  /// How long an outbound call waits for the target node to connect before
  /// failing with a timeout.
  pub(crate) connection_timeout: Duration,
  /// Delay before the first reconnect attempt of a client connection.
  pub(crate) reconnect_initial_delay: Duration,
  /// Upper bound on the exponential reconnect backoff.
  pub(crate) reconnect_max_delay: Duration,
}

impl Default for SystemConfig {
  fn default() -> Self {
    Self {
      connection_timeout: Duration::from_secs(30),
      reconnect_initial_delay: Duration::from_millis(250),
      reconnect_max_delay: Duration::from_secs(10),
    }
  }
}
