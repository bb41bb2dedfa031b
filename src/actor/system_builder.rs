use std::time::Duration;

use crate::actor::ActorSystem;
use crate::actor::SystemConfig;

/// Builder for an [`ActorSystem`].
#[derive(Debug, Default)]
pub struct SystemBuilder {
  config: SystemConfig,
}

impl SystemBuilder {
  pub fn new() -> SystemBuilder {
    SystemBuilder {
      config: SystemConfig::default(),
    }
  }

  /// How long outbound calls wait for their target node to connect.
  #[must_use]
  pub fn connection_timeout(mut self, timeout: Duration) -> SystemBuilder {
    self.config.connection_timeout = timeout;
    self
  }

  /// Bounds for the client reconnect backoff.
  #[must_use]
  pub fn reconnect_delays(mut self, initial: Duration, max: Duration) -> SystemBuilder {
    self.config.reconnect_initial_delay = initial;
    self.config.reconnect_max_delay = max;
    self
  }

  pub fn build(self) -> ActorSystem {
    ActorSystem::with_config(self.config)
  }
}
