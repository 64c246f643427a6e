//! Presence reconciliation
//!
//! The transport reports the full set of connected peer ids on every change.
//! The reconciler diffs each snapshot against the peers it already knows and
//! updates the directory: departed peers are removed, new peers get a
//! placeholder entry until their settings arrive.
//!
//! Settings can reach us from a peer the transport does not list, either
//! ahead of its presence or late after it left. Such peers are held as
//! unlisted and dropped from the directory by the next snapshot that still
//! lacks them.

use crate::directory::PeerDirectory;
use crate::types::{PeerId, PeerUpdate};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Result of reconciling one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceDelta {
    pub joined: Vec<PeerId>,
    pub left: Vec<PeerId>,
}

impl PresenceDelta {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// Tracks which remote peers the transport currently reports
pub struct PresenceReconciler {
    self_id: PeerId,
    known: BTreeSet<PeerId>,
    unlisted: BTreeSet<PeerId>,
}

impl PresenceReconciler {
    pub fn new(self_id: PeerId) -> Self {
        Self {
            self_id,
            known: BTreeSet::new(),
            unlisted: BTreeSet::new(),
        }
    }

    pub fn is_present(&self, peer_id: &str) -> bool {
        self.known.contains(peer_id)
    }

    /// Note a directory entry created for a peer outside the presence set
    pub fn track_unlisted(&mut self, peer_id: &str) {
        if peer_id.is_empty() || peer_id == self.self_id || self.is_present(peer_id) {
            return;
        }
        self.unlisted.insert(peer_id.to_string());
    }

    /// Apply a presence snapshot. Running it twice is a no-op.
    pub fn reconcile(
        &mut self,
        snapshot: &[PeerId],
        directory: &mut PeerDirectory,
    ) -> PresenceDelta {
        let current: BTreeSet<PeerId> = snapshot
            .iter()
            .filter(|id| !id.is_empty() && **id != self.self_id)
            .cloned()
            .collect();

        let joined: Vec<PeerId> = current.difference(&self.known).cloned().collect();
        let left: Vec<PeerId> = self.known.difference(&current).cloned().collect();

        for id in &left {
            directory.remove(id);
            info!("Presence: Peer \"{}\" left", id);
        }
        for id in std::mem::take(&mut self.unlisted) {
            if !current.contains(&id) && directory.remove(&id).is_some() {
                debug!("Presence: Dropped unlisted peer \"{}\"", id);
            }
        }
        for id in &joined {
            directory.upsert(id, &PeerUpdate::default());
            info!("Presence: Peer \"{}\" joined", id);
        }

        self.known = current;
        PresenceDelta { joined, left }
    }

    /// Forget every peer, as if an empty snapshot arrived
    pub fn reset(&mut self, directory: &mut PeerDirectory) -> PresenceDelta {
        self.reconcile(&[], directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Peer;

    fn setup() -> (PresenceReconciler, PeerDirectory) {
        let self_id = "me".to_string();
        (
            PresenceReconciler::new(self_id.clone()),
            PeerDirectory::new(Peer::new(self_id)),
        )
    }

    fn ids(list: &[&str]) -> Vec<PeerId> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_join_and_leave() {
        let (mut presence, mut dir) = setup();

        let delta = presence.reconcile(&ids(&["a", "b", "me"]), &mut dir);
        assert_eq!(delta.joined, ids(&["a", "b"]));
        assert!(delta.left.is_empty());
        assert!(dir.contains("a") && dir.contains("b"));

        let delta = presence.reconcile(&ids(&["b", "c"]), &mut dir);
        assert_eq!(delta.joined, ids(&["c"]));
        assert_eq!(delta.left, ids(&["a"]));
        assert!(!dir.contains("a"));
    }

    #[test]
    fn test_idempotent() {
        let (mut presence, mut dir) = setup();
        presence.reconcile(&ids(&["a"]), &mut dir);
        assert!(presence.reconcile(&ids(&["a"]), &mut dir).is_empty());
    }

    #[test]
    fn test_leave_reported_once() {
        let (mut presence, mut dir) = setup();
        presence.reconcile(&ids(&["a", "b"]), &mut dir);

        let first = presence.reconcile(&ids(&["b"]), &mut dir);
        let second = presence.reconcile(&ids(&["b"]), &mut dir);

        assert_eq!(first.left, ids(&["a"]));
        assert!(second.left.is_empty());
        assert!(!dir.contains("a"));
    }

    #[test]
    fn test_empty_snapshot_means_no_peers() {
        let (mut presence, mut dir) = setup();
        presence.reconcile(&ids(&["a", ""]), &mut dir);

        let delta = presence.reconcile(&[], &mut dir);
        assert_eq!(delta.left, ids(&["a"]));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_late_settings_after_leave_do_not_linger() {
        let (mut presence, mut dir) = setup();
        presence.reconcile(&ids(&["a", "b"]), &mut dir);
        presence.reconcile(&ids(&["a"]), &mut dir);

        dir.upsert("b", &PeerUpdate::name("Bob"));
        presence.track_unlisted("b");
        assert!(dir.contains("b"));

        let delta = presence.reconcile(&ids(&["a"]), &mut dir);
        assert!(delta.is_empty());
        assert!(!dir.contains("b"));
    }

    #[test]
    fn test_unlisted_peer_joins_normally() {
        let (mut presence, mut dir) = setup();
        dir.upsert("a", &PeerUpdate::name("Early"));
        presence.track_unlisted("a");

        let delta = presence.reconcile(&ids(&["a"]), &mut dir);
        assert_eq!(delta.joined, ids(&["a"]));
        assert!(presence.is_present("a"));
        assert_eq!(dir.get("a").unwrap().name, "Early");
    }

    #[test]
    fn test_join_keeps_settings_that_arrived_first() {
        let (mut presence, mut dir) = setup();
        dir.upsert("a", &PeerUpdate::name("Early"));

        let delta = presence.reconcile(&ids(&["a"]), &mut dir);
        assert_eq!(delta.joined, ids(&["a"]));
        assert_eq!(dir.get("a").unwrap().name, "Early");
    }
}
