//! Peer directory: the local view of every known peer

use crate::types::{Peer, PeerId, PeerUpdate};
use std::collections::HashMap;
use tracing::debug;

/// Passive storage for self and remote peers
pub struct PeerDirectory {
    self_id: PeerId,
    peers: HashMap<PeerId, Peer>,
}

impl PeerDirectory {
    /// Create a directory seeded with the local peer
    pub fn new(local: Peer) -> Self {
        let self_id = local.id.clone();
        let mut peers = HashMap::new();
        peers.insert(self_id.clone(), local);
        Self { self_id, peers }
    }

    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    /// The local peer's entry
    pub fn local(&self) -> &Peer {
        // Seeded in `new` and never removed.
        &self.peers[&self.self_id]
    }

    /// Merge `update` into the peer, creating it with defaults if absent
    pub fn upsert(&mut self, peer_id: &str, update: &PeerUpdate) -> &Peer {
        let peer = self.peers.entry(peer_id.to_string()).or_insert_with(|| {
            debug!("Directory: New peer {}", peer_id);
            Peer::new(peer_id.to_string())
        });
        peer.apply(update);
        peer
    }

    /// Remove a remote peer. The local peer is never removed.
    pub fn remove(&mut self, peer_id: &str) -> Option<Peer> {
        if peer_id == self.self_id {
            return None;
        }
        self.peers.remove(peer_id)
    }

    pub fn get(&self, peer_id: &str) -> Option<&Peer> {
        self.peers.get(peer_id)
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// All peers in arbitrary order
    pub fn all(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    /// Self first, then alphabetical by name
    pub fn sorted_for_display(&self) -> Vec<&Peer> {
        let mut peers: Vec<&Peer> = self.peers.values().collect();
        peers.sort_by(|a, b| {
            let a_self = a.id == self.self_id;
            let b_self = b.id == self.self_id;
            b_self
                .cmp(&a_self)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.id.cmp(&b.id))
        });
        peers
    }

    /// Number of peers including self
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Number of remote peers
    pub fn remote_count(&self) -> usize {
        self.peers.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> PeerDirectory {
        let mut local = Peer::new("self-id".to_string());
        local.name = "Zed".to_string();
        PeerDirectory::new(local)
    }

    #[test]
    fn test_upsert_creates_with_defaults() {
        let mut dir = directory();
        let peer = dir.upsert("remote-peer-1", &PeerUpdate::default());
        assert_eq!(peer.name, "remote-p");
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.remote_count(), 1);
    }

    #[test]
    fn test_upsert_merges() {
        let mut dir = directory();
        dir.upsert("r1", &PeerUpdate::name("Alice"));
        dir.upsert("r1", &PeerUpdate::color("#00ff00"));

        let peer = dir.get("r1").unwrap();
        assert_eq!(peer.name, "Alice");
        assert_eq!(peer.color, "#00ff00");
    }

    #[test]
    fn test_self_cannot_be_removed() {
        let mut dir = directory();
        assert!(dir.remove("self-id").is_none());
        assert!(dir.contains("self-id"));

        dir.upsert("r1", &PeerUpdate::default());
        assert!(dir.remove("r1").is_some());
        assert!(dir.get("r1").is_none());
    }

    #[test]
    fn test_display_order() {
        let mut dir = directory();
        dir.upsert("r1", &PeerUpdate::name("bob"));
        dir.upsert("r2", &PeerUpdate::name("Alice"));

        let names: Vec<&str> = dir.sorted_for_display().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Zed", "Alice", "bob"]);
    }
}
