//! In-process dice room cluster
//!
//! Runs N [`RoomSession`]s over a shared [`MemoryHub`]. The cluster owns
//! delivery: it drains the hub, lets the fault injector shape each batch,
//! and hands every copy to its receiving session.

use crate::fault_injection::FaultInjector;
use crate::metrics::Metrics;
use crate::workload::Operation;
use diceroom_core::{
    DieId, MemoryHub, Peer, PeerId, Recorder, RoomConfig, RoomEvent, RoomSession, TransportEvent,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// One simulated player
pub struct ClusterPeer {
    pub session: RoomSession,
    pub recorder: Recorder,
}

/// Multi-peer test cluster
pub struct Cluster {
    hub: MemoryHub,
    peers: BTreeMap<PeerId, ClusterPeer>,
    config: RoomConfig,
    seed: u64,
    joined: usize,
}

impl Cluster {
    /// Create a cluster with `num_peers` initialised sessions
    pub fn new(num_peers: usize, seed: u64) -> Self {
        Self::with_config(num_peers, seed, RoomConfig::default())
    }

    pub fn with_config(num_peers: usize, seed: u64, config: RoomConfig) -> Self {
        let mut cluster = Self {
            hub: MemoryHub::new(),
            peers: BTreeMap::new(),
            config,
            seed,
            joined: 0,
        };
        for _ in 0..num_peers {
            cluster.add_peer();
        }
        cluster
    }

    /// Join a new peer to the hub and initialise its session
    pub fn add_peer(&mut self) -> PeerId {
        let peer_id = format!("peer-{}", self.joined);
        let seed = self.seed.wrapping_add(self.joined as u64 + 1);
        self.joined += 1;

        let mut local = Peer::new(peer_id.clone());
        local.name = format!("Player {}", self.joined);

        let recorder = Recorder::new();
        let transport = self.hub.join(&peer_id);
        let mut session = RoomSession::new(
            self.config.clone(),
            local,
            Box::new(transport),
            vec![Box::new(recorder.clone())],
        )
        .seeded(seed);
        session.init();

        debug!("Cluster: {} joined", peer_id);
        self.peers.insert(peer_id.clone(), ClusterPeer { session, recorder });
        peer_id
    }

    /// Tear a peer down and take it off the hub
    pub fn remove_peer(&mut self, peer_id: &str) -> bool {
        let Some(mut peer) = self.peers.remove(peer_id) else {
            return false;
        };
        peer.session.teardown();
        self.hub.leave(peer_id);
        debug!("Cluster: {} left", peer_id);
        true
    }

    pub fn set_echo(&self, echo: bool) {
        self.hub.set_echo(echo);
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn session(&self, peer_id: &str) -> Option<&RoomSession> {
        self.peers.get(peer_id).map(|p| &p.session)
    }

    pub fn session_mut(&mut self, peer_id: &str) -> Option<&mut RoomSession> {
        self.peers.get_mut(peer_id).map(|p| &mut p.session)
    }

    /// Push the hub's presence set to every session
    pub fn announce_presence(&mut self) {
        let snapshot = self.hub.presence();
        for peer in self.peers.values_mut() {
            peer.session
                .handle_transport_event(TransportEvent::Presence(snapshot.clone()));
        }
    }

    /// Perform one local operation on `peer_id`
    pub fn perform(&mut self, peer_id: &str, op: &Operation, metrics: &mut Metrics) {
        let Some(peer) = self.peers.get_mut(peer_id) else {
            return;
        };
        let session = &mut peer.session;
        metrics.count_operation();

        match op {
            Operation::Add { sides } => {
                if let Err(e) = session.add_die(*sides) {
                    warn!("Cluster: {} add failed: {}", peer_id, e);
                }
            }
            Operation::Remove { pick } => {
                let own: Vec<DieId> = session.pool().own_dice().into_iter().map(|d| d.id).collect();
                if !own.is_empty() {
                    session.remove_die(&own[pick % own.len()]);
                }
            }
            Operation::Clear => {
                session.clear_dice();
            }
            Operation::Roll => {
                if session.roll_pool().is_some() {
                    metrics.count_roll();
                }
            }
            Operation::Quick { sides } => match session.quick_roll(*sides) {
                Ok(Some(_)) => metrics.count_roll(),
                Ok(None) => {}
                Err(e) => warn!("Cluster: {} quick roll failed: {}", peer_id, e),
            },
            Operation::Recolor { color } => {
                if let Err(e) = session.set_color(color) {
                    warn!("Cluster: {} recolor failed: {}", peer_id, e);
                }
            }
            Operation::Emoji { emoji } => {
                if let Err(e) = session.send_emoji(emoji) {
                    warn!("Cluster: {} emoji failed: {}", peer_id, e);
                }
            }
            Operation::Cursor { x, y } => {
                if let Err(e) = session.move_cursor(*x, *y) {
                    warn!("Cluster: {} cursor failed: {}", peer_id, e);
                }
            }
        }
    }

    /// Deliver everything currently in flight. Returns copies delivered.
    pub fn deliver_round(&mut self, injector: &mut FaultInjector, metrics: &mut Metrics) -> usize {
        let batch = injector.apply(self.hub.take_in_flight());
        let mut delivered = 0;

        for routed in batch {
            let Some(peer) = self.peers.get_mut(&routed.to) else {
                continue;
            };
            metrics.count_message(&routed.envelope.channel);
            peer.session
                .handle_transport_event(TransportEvent::Envelope(routed.envelope));
            delivered += 1;
        }
        delivered
    }

    /// Deliver rounds until nothing is in flight. Returns rounds run.
    pub fn run_to_quiescence(
        &mut self,
        injector: &mut FaultInjector,
        metrics: &mut Metrics,
        max_rounds: usize,
    ) -> usize {
        for round in 0..max_rounds {
            if self.hub.pending() == 0 {
                return round;
            }
            self.deliver_round(injector, metrics);
            metrics.delivery_rounds += 1;
        }
        if self.hub.pending() > 0 {
            warn!(
                "Cluster: Still {} copies in flight after {} rounds",
                self.hub.pending(),
                max_rounds
            );
        }
        max_rounds
    }

    /// Complete every pending roll animation
    pub fn finish_animations(&mut self) {
        for peer in self.peers.values_mut() {
            if let Some(roll_id) = peer.session.pending_roll().map(|r| r.id.clone()) {
                peer.session.finish_roll(&roll_id, Ok(()));
            }
        }
    }

    /// Die ids staged at one peer
    pub fn pool_ids(&self, peer_id: &str) -> BTreeSet<DieId> {
        self.session(peer_id)
            .map(|s| s.pool().dice().iter().map(|d| d.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Peers whose pool differs from the most common pool
    pub fn diverging_peers(&self) -> Vec<PeerId> {
        let pools: BTreeMap<PeerId, BTreeSet<DieId>> =
            self.peers.keys().map(|id| (id.clone(), self.pool_ids(id))).collect();

        let mut votes: Vec<(&BTreeSet<DieId>, usize)> = Vec::new();
        for pool in pools.values() {
            match votes.iter_mut().find(|(p, _)| *p == pool) {
                Some((_, count)) => *count += 1,
                None => votes.push((pool, 1)),
            }
        }
        // Earliest pool wins a tie
        let Some(majority) = votes
            .iter()
            .fold(None::<&(&BTreeSet<DieId>, usize)>, |best, v| match best {
                Some(b) if b.1 >= v.1 => Some(b),
                _ => Some(v),
            })
            .map(|(pool, _)| *pool)
        else {
            return Vec::new();
        };

        pools
            .iter()
            .filter(|(_, pool)| *pool != majority)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Get summary statistics
    pub fn stats(&self) -> ClusterStats {
        let mut stats = ClusterStats {
            peers: self.peers.len(),
            ..Default::default()
        };

        for peer in self.peers.values() {
            let session = peer.session.stats();
            stats.received += session.received;
            stats.applied += session.applied;
            stats.dropped_self_echo += session.dropped_self_echo;
            stats.dropped_malformed += session.dropped_malformed;
            stats.duplicate_rolls += session.duplicate_rolls;
            stats.rolls_completed += peer
                .recorder
                .count(|e| matches!(e, RoomEvent::RollCompleted { .. }));
        }

        info!(
            "Cluster: {} peers, {} received, {} applied",
            stats.peers, stats.received, stats.applied
        );
        stats
    }
}

/// Cluster statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterStats {
    pub peers: usize,
    pub received: u64,
    pub applied: u64,
    pub dropped_self_echo: u64,
    pub dropped_malformed: u64,
    pub duplicate_rolls: u64,
    pub rolls_completed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault_injection::FaultConfig;

    #[test]
    fn test_cluster_basic() {
        let mut cluster = Cluster::new(3, 1);
        let mut injector = FaultInjector::new(FaultConfig::none(), 1);
        let mut metrics = Metrics::new();

        cluster.announce_presence();
        cluster.run_to_quiescence(&mut injector, &mut metrics, 16);

        cluster.perform("peer-0", &Operation::Add { sides: 6 }, &mut metrics);
        cluster.perform("peer-1", &Operation::Add { sides: 20 }, &mut metrics);
        cluster.run_to_quiescence(&mut injector, &mut metrics, 16);

        for id in cluster.peer_ids() {
            assert_eq!(cluster.session(&id).unwrap().pool().len(), 2);
            assert_eq!(cluster.session(&id).unwrap().directory().len(), 3);
        }
        assert!(cluster.diverging_peers().is_empty());
        assert_eq!(metrics.message_counts["pool:add"], 4);
    }

    #[test]
    fn test_roll_consumes_pool_everywhere() {
        let mut cluster = Cluster::new(3, 2);
        let mut injector = FaultInjector::new(FaultConfig::light(), 2);
        let mut metrics = Metrics::new();
        cluster.set_echo(true);
        cluster.announce_presence();

        cluster.perform("peer-0", &Operation::Add { sides: 8 }, &mut metrics);
        cluster.perform("peer-2", &Operation::Add { sides: 4 }, &mut metrics);
        cluster.run_to_quiescence(&mut injector, &mut metrics, 16);

        cluster.perform("peer-1", &Operation::Roll, &mut metrics);
        cluster.run_to_quiescence(&mut injector, &mut metrics, 16);
        cluster.finish_animations();

        assert_eq!(metrics.rolls, 1);
        for id in cluster.peer_ids() {
            let session = cluster.session(&id).unwrap();
            assert!(session.pool().is_empty());
            assert_eq!(session.history().len(), 1);
        }
        let stats = cluster.stats();
        assert_eq!(stats.rolls_completed, 3);
        assert!(stats.dropped_self_echo > 0);
    }

    #[test]
    fn test_diverging_peer_detected() {
        let mut cluster = Cluster::new(3, 3);
        let mut metrics = Metrics::new();

        // Nothing is delivered, so only peer-1 sees its die
        cluster.perform("peer-1", &Operation::Add { sides: 12 }, &mut metrics);

        assert_eq!(cluster.diverging_peers(), vec!["peer-1".to_string()]);
    }

    #[test]
    fn test_remove_peer() {
        let mut cluster = Cluster::new(2, 4);
        assert!(cluster.remove_peer("peer-0"));
        assert!(!cluster.remove_peer("peer-0"));
        assert_eq!(cluster.peer_ids(), vec!["peer-1".to_string()]);
    }
}
