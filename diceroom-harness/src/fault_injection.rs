//! Fault injection for convergence testing
//!
//! Faults are applied to each batch of in-flight copies before delivery:
//! - Message loss
//! - Duplication
//! - Garbage copies on unknown channels
//! - Reordering across links
//! - Self-echo (configured on the hub)
//!
//! Reordering interleaves the per-link queues at random but keeps each
//! sender-to-receiver link FIFO, and duplicates follow their original on
//! the same link.

use diceroom_core::{PeerId, Routed};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Fault injection configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultConfig {
    /// Probability of message loss (0.0-1.0)
    pub message_loss_rate: f64,
    /// Probability that a copy is delivered twice
    pub duplicate_rate: f64,
    /// Probability of an extra undecodable copy next to the real one
    pub garbage_rate: f64,
    /// Loop every broadcast back to its sender
    pub echo: bool,
    /// Interleave links at random instead of send order
    pub reorder: bool,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            message_loss_rate: 0.0,
            duplicate_rate: 0.0,
            garbage_rate: 0.0,
            echo: false,
            reorder: false,
        }
    }
}

impl FaultConfig {
    /// No faults (happy path)
    pub fn none() -> Self {
        Self::default()
    }

    /// Light faults (self-echo, reordering)
    pub fn light() -> Self {
        Self {
            echo: true,
            reorder: true,
            ..Default::default()
        }
    }

    /// Medium faults (30% duplicates, garbage, echo, reordering)
    pub fn medium() -> Self {
        Self {
            duplicate_rate: 0.30,
            garbage_rate: 0.05,
            ..Self::light()
        }
    }

    /// Heavy faults (medium plus 10% message loss)
    pub fn heavy() -> Self {
        Self {
            message_loss_rate: 0.10,
            ..Self::medium()
        }
    }

    /// Whether delivery is still at-least-once
    pub fn is_lossless(&self) -> bool {
        self.message_loss_rate <= 0.0
    }
}

/// Fault counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub dropped: u64,
    pub duplicated: u64,
    pub garbage: u64,
}

/// Fault injector
pub struct FaultInjector {
    config: FaultConfig,
    rng: StdRng,
    stats: FaultStats,
}

impl FaultInjector {
    /// Create a new fault injector
    pub fn new(config: FaultConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            stats: FaultStats::default(),
        }
    }

    pub fn stats(&self) -> FaultStats {
        self.stats
    }

    /// Check if a message should be dropped
    pub fn should_drop_message(&mut self) -> bool {
        self.config.message_loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.message_loss_rate
    }

    fn should_duplicate(&mut self) -> bool {
        self.config.duplicate_rate > 0.0 && self.rng.gen::<f64>() < self.config.duplicate_rate
    }

    fn should_add_garbage(&mut self) -> bool {
        self.config.garbage_rate > 0.0 && self.rng.gen::<f64>() < self.config.garbage_rate
    }

    /// Turn one batch of in-flight copies into the order they are delivered in
    pub fn apply(&mut self, batch: Vec<Routed>) -> Vec<Routed> {
        let mut links: BTreeMap<(PeerId, PeerId), VecDeque<Routed>> = BTreeMap::new();
        let mut order = Vec::with_capacity(batch.len());

        for routed in batch {
            if self.should_drop_message() {
                self.stats.dropped += 1;
                debug!(
                    "Fault: Dropped {} from {} to {}",
                    routed.envelope.channel, routed.from, routed.to
                );
                continue;
            }

            let key = (routed.from.clone(), routed.to.clone());
            let queue = links.entry(key.clone()).or_default();

            if self.config.garbage_rate > 0.0 && self.should_add_garbage() {
                let mut garbage = routed.clone();
                garbage.envelope.channel = "bogus".to_string();
                queue.push_back(garbage);
                order.push(key.clone());
                self.stats.garbage += 1;
            }

            let duplicate = self.should_duplicate();
            if duplicate {
                queue.push_back(routed.clone());
                order.push(key.clone());
                self.stats.duplicated += 1;
            }
            queue.push_back(routed);
            order.push(key);
        }

        if !self.config.reorder {
            return order
                .into_iter()
                .filter_map(|key| links.get_mut(&key).and_then(|q| q.pop_front()))
                .collect();
        }

        let mut delivered = Vec::with_capacity(order.len());
        let mut keys: Vec<(PeerId, PeerId)> = links.keys().cloned().collect();
        while !keys.is_empty() {
            let index = self.rng.gen_range(0..keys.len());
            match links.get_mut(&keys[index]).and_then(|q| q.pop_front()) {
                Some(routed) => delivered.push(routed),
                None => {
                    keys.swap_remove(index);
                }
            }
        }
        delivered
    }
}

/// Named fault profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultScenario {
    /// No faults
    None,
    /// Message loss on top of duplicates and reordering
    Lossy,
    /// Duplicated and garbage copies, echo and reordering
    Duplicates,
    /// Late joiners under light faults
    LateJoin,
}

impl FaultScenario {
    /// Get fault config for this scenario
    pub fn config(&self) -> FaultConfig {
        match self {
            FaultScenario::None => FaultConfig::none(),
            FaultScenario::Lossy => FaultConfig::heavy(),
            FaultScenario::Duplicates => FaultConfig::medium(),
            FaultScenario::LateJoin => FaultConfig::light(),
        }
    }

    /// Get recommended number of peers for this scenario
    pub fn recommended_peers(&self) -> usize {
        match self {
            FaultScenario::None => 3,
            FaultScenario::Lossy => 4,
            FaultScenario::Duplicates => 4,
            FaultScenario::LateJoin => 3,
        }
    }

    /// Lost messages are never repaired, so only lossless profiles must converge
    pub fn must_converge(&self) -> bool {
        self.config().is_lossless()
    }
}

impl std::str::FromStr for FaultScenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "happy" => Ok(FaultScenario::None),
            "lossy" | "loss" => Ok(FaultScenario::Lossy),
            "duplicates" | "dup" => Ok(FaultScenario::Duplicates),
            "late-join" | "late_join" => Ok(FaultScenario::LateJoin),
            _ => Err(format!("Unknown fault scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diceroom_core::{Envelope, Message};

    fn routed(from: &str, to: &str, n: usize) -> Vec<Routed> {
        (0..n)
            .map(|i| {
                let mut envelope =
                    Envelope::new(from.to_string(), None, &Message::PoolSyncRequest).unwrap();
                envelope.payload = serde_json::json!(i);
                Routed {
                    from: from.to_string(),
                    to: to.to_string(),
                    envelope,
                }
            })
            .collect()
    }

    fn seq(batch: &[Routed], from: &str, to: &str) -> Vec<serde_json::Value> {
        batch
            .iter()
            .filter(|r| r.from == from && r.to == to && r.envelope.channel != "bogus")
            .map(|r| r.envelope.payload.clone())
            .collect()
    }

    #[test]
    fn test_fault_config_presets() {
        let none = FaultConfig::none();
        assert!(none.is_lossless());
        assert!(!none.echo);

        let medium = FaultConfig::medium();
        assert!(medium.is_lossless());
        assert!(medium.echo && medium.reorder);

        let heavy = FaultConfig::heavy();
        assert!(!heavy.is_lossless());
        assert_eq!(heavy.duplicate_rate, 0.30);
    }

    #[test]
    fn test_fault_scenario_parse() {
        assert_eq!("happy".parse::<FaultScenario>().unwrap(), FaultScenario::None);
        assert_eq!("late-join".parse::<FaultScenario>().unwrap(), FaultScenario::LateJoin);
        assert!("partition".parse::<FaultScenario>().is_err());
        assert!(!FaultScenario::Lossy.must_converge());
        assert!(FaultScenario::Duplicates.must_converge());
    }

    #[test]
    fn test_no_faults_keeps_send_order() {
        let mut injector = FaultInjector::new(FaultConfig::none(), 1);
        let mut batch = routed("a", "b", 5);
        batch.extend(routed("c", "b", 5));
        let expected = batch.clone();

        assert_eq!(injector.apply(batch), expected);
        assert_eq!(injector.stats(), FaultStats::default());
    }

    #[test]
    fn test_reorder_keeps_links_fifo() {
        let mut injector = FaultInjector::new(FaultConfig::medium(), 7);
        let mut batch = routed("a", "b", 20);
        batch.extend(routed("c", "b", 20));

        let delivered = injector.apply(batch);
        let stats = injector.stats();
        assert_eq!(delivered.len() as u64, 40 + stats.duplicated + stats.garbage);

        for (from, to) in [("a", "b"), ("c", "b")] {
            let mut values: Vec<u64> =
                seq(&delivered, from, to).iter().filter_map(|v| v.as_u64()).collect();
            let sorted = {
                let mut s = values.clone();
                s.sort();
                s
            };
            assert_eq!(values, sorted);
            values.dedup();
            assert_eq!(values, (0..20).collect::<Vec<u64>>());
        }
    }

    #[test]
    fn test_message_loss() {
        let config = FaultConfig {
            message_loss_rate: 1.0,
            ..Default::default()
        };
        let mut injector = FaultInjector::new(config, 3);

        assert!(injector.apply(routed("a", "b", 10)).is_empty());
        assert_eq!(injector.stats().dropped, 10);
    }
}
