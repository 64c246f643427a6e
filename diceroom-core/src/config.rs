//! Configuration for a room session
//!
//! Combines room behaviour with the settings of the network transport.

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::room::DEFAULT_ROOM;
use crate::transport::DEFAULT_PORT;
use std::time::Duration;

/// What happens to a departed peer's staged dice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DepartedDicePolicy {
    /// Leave them in the pool; anyone can still roll them
    #[default]
    Keep,
    /// Remove them locally when the peer leaves
    Purge,
}

/// Complete session configuration
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Room identifier
    pub room: String,

    /// Number of rolls kept in history
    pub history_capacity: usize,

    /// Delay between connecting and requesting a pool sync
    pub sync_delay: Duration,

    /// Departed peer dice handling
    pub departed_dice: DepartedDicePolicy,

    /// How long a headless renderer pretends to animate
    pub animation: Duration,

    pub transport: TransportConfig,
}

/// Network-specific configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// UDP port for envelopes
    pub port: u16,

    /// Whether to use mDNS for presence
    pub use_mdns: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            room: DEFAULT_ROOM.to_string(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            sync_delay: Duration::from_millis(500),
            departed_dice: DepartedDicePolicy::Keep,
            animation: Duration::from_millis(1500),
            transport: TransportConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            use_mdns: true,
        }
    }
}

impl RoomConfig {
    /// Create config for a room
    pub fn new(room: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            ..Default::default()
        }
    }

    /// Set history size
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set the post-connect sync delay
    pub fn with_sync_delay(mut self, delay: Duration) -> Self {
        self.sync_delay = delay;
        self
    }

    /// Set departed dice policy
    pub fn with_departed_dice(mut self, policy: DepartedDicePolicy) -> Self {
        self.departed_dice = policy;
        self
    }

    /// Set animation time for headless rendering
    pub fn with_animation(mut self, duration: Duration) -> Self {
        self.animation = duration;
        self
    }

    /// Set UDP port
    pub fn with_port(mut self, port: u16) -> Self {
        self.transport.port = port;
        self
    }

    /// Disable mDNS discovery
    pub fn without_mdns(mut self) -> Self {
        self.transport.use_mdns = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RoomConfig::default();
        assert_eq!(config.room, "main");
        assert_eq!(config.history_capacity, 20);
        assert_eq!(config.sync_delay, Duration::from_millis(500));
        assert_eq!(config.departed_dice, DepartedDicePolicy::Keep);
        assert_eq!(config.transport.port, 9990);
    }

    #[test]
    fn test_config_builder() {
        let config = RoomConfig::new("tavern")
            .with_history_capacity(5)
            .with_departed_dice(DepartedDicePolicy::Purge)
            .with_port(9991)
            .without_mdns();

        assert_eq!(config.room, "tavern");
        assert_eq!(config.history_capacity, 5);
        assert_eq!(config.departed_dice, DepartedDicePolicy::Purge);
        assert_eq!(config.transport.port, 9991);
        assert!(!config.transport.use_mdns);
    }
}
