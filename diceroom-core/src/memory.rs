//! In-process transport hub
//!
//! Every joined peer gets a [`MemoryTransport`]. Sends are fanned out into an
//! in-flight queue of [`Routed`] copies, one per receiver, which the driver
//! (tests or the harness) drains and delivers, optionally dropping,
//! duplicating or reordering them first.

use crate::error::TransportError;
use crate::message::Envelope;
use crate::transport::Transport;
use crate::types::PeerId;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One copy of an envelope on its way to one receiver
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub from: PeerId,
    pub to: PeerId,
    pub envelope: Envelope,
}

#[derive(Default)]
struct HubState {
    members: BTreeSet<PeerId>,
    in_flight: Vec<Routed>,
    /// Loop every send back to its sender as well
    echo: bool,
    sent: u64,
}

/// Shared broadcast medium for in-process peers
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member and hand back its transport
    pub fn join(&self, peer_id: &str) -> MemoryTransport {
        self.state.lock().members.insert(peer_id.to_string());
        MemoryTransport {
            peer_id: peer_id.to_string(),
            hub: self.clone(),
        }
    }

    /// Remove a member. Copies already in flight to it are dropped.
    pub fn leave(&self, peer_id: &str) {
        let mut state = self.state.lock();
        state.members.remove(peer_id);
        state.in_flight.retain(|r| r.to != peer_id);
    }

    /// Current presence set
    pub fn presence(&self) -> Vec<PeerId> {
        self.state.lock().members.iter().cloned().collect()
    }

    pub fn set_echo(&self, echo: bool) {
        self.state.lock().echo = echo;
    }

    /// Drain everything queued for delivery
    pub fn take_in_flight(&self) -> Vec<Routed> {
        std::mem::take(&mut self.state.lock().in_flight)
    }

    pub fn pending(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Number of envelopes accepted from members
    pub fn sent(&self) -> u64 {
        self.state.lock().sent
    }
}

/// A member's handle on the hub
pub struct MemoryTransport {
    peer_id: PeerId,
    hub: MemoryHub,
}

impl Transport for MemoryTransport {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        let mut state = self.hub.state.lock();
        if !state.members.contains(&self.peer_id) {
            return Err(TransportError::Closed);
        }
        state.sent += 1;

        let receivers: Vec<PeerId> = state
            .members
            .iter()
            .filter(|m| state.echo || **m != self.peer_id)
            .cloned()
            .collect();
        for to in receivers {
            state.in_flight.push(Routed {
                from: self.peer_id.clone(),
                to,
                envelope: envelope.clone(),
            });
        }
        Ok(())
    }
}
