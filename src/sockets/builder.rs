//! Builder for [`NetworkingSockets`].

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use super::networking::NetworkingSockets;
use crate::config::{ConfigKey, ConfigScope, ConfigStore, ConfigValue};
use crate::core::{PeerIdentity, SocketResult};
use crate::events::{DeliveryMode, EventHandler};

/// Settings applied when a [`NetworkingSockets`] instance is built.
#[derive(Debug, Clone)]
pub struct SocketsConfig {
    /// Identity reported to peers.
    pub local_identity: PeerIdentity,

    /// How events reach their handlers.
    pub delivery_mode: DeliveryMode,

    /// Seed for the fake-loss generator. Random when unset.
    pub rng_seed: Option<u64>,

    /// Values stored at global scope before the instance is returned.
    pub globals: Vec<(ConfigKey, ConfigValue)>,
}

impl Default for SocketsConfig {
    fn default() -> Self {
        Self {
            local_identity: PeerIdentity::LocalHost,
            delivery_mode: DeliveryMode::Queued,
            rng_seed: None,
            globals: Vec::new(),
        }
    }
}

/// Builder for creating a [`NetworkingSockets`] instance.
#[derive(Debug, Default)]
pub struct NetworkingSocketsBuilder {
    config: SocketsConfig,
}

impl NetworkingSocketsBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity reported to peers.
    pub fn local_identity(mut self, identity: PeerIdentity) -> Self {
        self.config.local_identity = identity;
        self
    }

    /// Set the event delivery mode.
    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.config.delivery_mode = mode;
        self
    }

    /// Seed the fake-loss generator for reproducible runs.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    /// Store a global config value.
    pub fn global(mut self, key: ConfigKey, value: impl Into<ConfigValue>) -> Self {
        self.config.globals.push((key, value.into()));
        self
    }

    /// Install a global connection-status handler.
    pub fn on_connection_status_changed(self, handler: EventHandler) -> Self {
        self.global(ConfigKey::ConnectionStatusChanged, handler)
    }

    /// Install a global async-completion handler.
    pub fn on_async_call_completed(self, handler: EventHandler) -> Self {
        self.global(ConfigKey::AsyncCallCompleted, handler)
    }

    /// The settings collected so far.
    pub fn config(&self) -> &SocketsConfig {
        &self.config
    }

    /// Build the instance. Fails if a global value is rejected.
    pub fn build(self) -> SocketResult<NetworkingSockets> {
        let SocketsConfig {
            local_identity,
            delivery_mode,
            rng_seed,
            globals,
        } = self.config;

        let store = Arc::new(ConfigStore::new());
        for (key, value) in globals {
            store.set(ConfigScope::Global, key, value)?;
        }
        let rng = match rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(identity = %local_identity, mode = ?delivery_mode, "networking sockets ready");
        Ok(NetworkingSockets::from_parts(
            local_identity,
            delivery_mode,
            rng,
            store,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = NetworkingSocketsBuilder::new();
        assert_eq!(builder.config().local_identity, PeerIdentity::LocalHost);
        assert_eq!(builder.config().delivery_mode, DeliveryMode::Queued);

        let sockets = builder.build().unwrap();
        assert_eq!(sockets.delivery_mode(), DeliveryMode::Queued);
    }

    #[test]
    fn test_builder_globals() {
        let sockets = NetworkingSocketsBuilder::new()
            .local_identity(PeerIdentity::Id(9))
            .delivery_mode(DeliveryMode::Immediate)
            .global(ConfigKey::SendBufferSize, 4096)
            .on_connection_status_changed(EventHandler::new(|_| {}))
            .build()
            .unwrap();

        assert_eq!(sockets.local_identity(), &PeerIdentity::Id(9));
        assert_eq!(
            sockets
                .config
                .get_i32(ConfigScope::Global, ConfigKey::SendBufferSize)
                .unwrap(),
            4096
        );
        assert!(
            sockets
                .config
                .get_handler(ConfigScope::Global, ConfigKey::ConnectionStatusChanged)
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_builder_rejects_bad_global() {
        let result = NetworkingSocketsBuilder::new()
            .global(ConfigKey::SendRateMax, 0)
            .build();
        assert!(result.is_err());
    }
}
