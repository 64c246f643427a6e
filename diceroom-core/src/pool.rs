//! Replicated dice pool
//!
//! Every peer keeps its own copy of the staged dice. Local mutations return
//! the message to broadcast; remote operations are applied idempotently so
//! duplicated or reordered delivery converges to the same set of die ids.
//!
//! Rules:
//! - a peer only authors add/remove/clear for dice it owns
//! - removal is by id, whatever owner the local copy records
//! - removing an unknown id is a no-op
//! - a sync only ever adds missing dice
//! - an id once removed, cleared or rolled is never staged again

use crate::error::PoolError;
use crate::message::Message;
use crate::types::{is_valid_sides, Die, DieId, Peer, PeerId};
use rand::Rng;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Retired die ids remembered to reject late adds and syncs
const RETIRED_WINDOW: usize = 4096;

/// Bounded set of die ids that left the pool
#[derive(Default)]
struct Retired {
    order: VecDeque<DieId>,
    ids: HashSet<DieId>,
}

impl Retired {
    fn insert(&mut self, id: DieId) {
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > RETIRED_WINDOW {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn contains(&self, id: &DieId) -> bool {
        self.ids.contains(id)
    }
}

/// One peer's replica of the shared pool
pub struct DicePool {
    self_id: PeerId,
    /// Staged dice in insertion order
    dice: Vec<Die>,
    retired: Retired,
}

impl DicePool {
    pub fn new(self_id: PeerId) -> Self {
        Self {
            self_id,
            dice: Vec::new(),
            retired: Retired::default(),
        }
    }

    /// Stage a new die owned by `owner` (the local peer)
    pub fn add_local<R: Rng + ?Sized>(
        &mut self,
        sides: u8,
        owner: &Peer,
        rng: &mut R,
    ) -> Result<(Die, Message), PoolError> {
        if !is_valid_sides(sides) {
            return Err(PoolError::InvalidSides(sides));
        }

        let die = Die {
            id: DieId::generate(rng),
            sides,
            peer_id: self.self_id.clone(),
            player_name: owner.name.clone(),
            color: owner.color.clone(),
        };
        self.dice.push(die.clone());
        debug!("Pool: Added d{} ({})", sides, die.id);

        let msg = Message::PoolAdd(die.clone());
        Ok((die, msg))
    }

    /// Remove a die by id
    pub fn remove_local(&mut self, die_id: &DieId) -> Option<Message> {
        let index = self.dice.iter().position(|d| &d.id == die_id)?;
        let die = self.dice.remove(index);
        self.retired.insert(die.id.clone());
        debug!("Pool: Removed d{} ({})", die.sides, die.id);

        Some(Message::PoolRemove {
            die_id: die.id,
            peer_id: self.self_id.clone(),
        })
    }

    /// Remove every die owned by the local peer
    pub fn clear_local(&mut self) -> Option<Message> {
        let removed = self.remove_owned_by(&self.self_id.clone());
        if removed == 0 {
            return None;
        }
        debug!("Pool: Cleared {} own dice", removed);

        Some(Message::PoolClear {
            peer_id: self.self_id.clone(),
        })
    }

    /// Apply an `add` from the network. Returns whether the pool changed.
    pub fn apply_remote_add(&mut self, die: Die) -> bool {
        if die.peer_id == self.self_id {
            return false;
        }
        if !is_valid_sides(die.sides) {
            warn!("Pool: Ignoring d{} from {}", die.sides, die.peer_id);
            return false;
        }
        if self.contains(&die.id) || self.retired.contains(&die.id) {
            return false;
        }
        self.dice.push(die);
        true
    }

    /// Apply a `remove` from the network
    pub fn apply_remote_remove(&mut self, die_id: &DieId, peer_id: &str) -> bool {
        if peer_id == self.self_id {
            return false;
        }
        self.retired.insert(die_id.clone());
        match self.dice.iter().position(|d| &d.id == die_id) {
            Some(index) => {
                self.dice.remove(index);
                true
            }
            None => false,
        }
    }

    /// Apply a `clear` from the network
    pub fn apply_remote_clear(&mut self, peer_id: &str) -> bool {
        if peer_id == self.self_id {
            return false;
        }
        self.remove_owned_by(peer_id) > 0
    }

    /// Drop dice consumed by a roll another peer executed
    pub fn apply_remote_roll(&mut self, rolled: &[DieId]) -> bool {
        for id in rolled {
            self.retired.insert(id.clone());
        }
        let before = self.dice.len();
        self.dice.retain(|d| !rolled.contains(&d.id));
        before != self.dice.len()
    }

    /// Drop a departed peer's dice
    pub fn purge_owner(&mut self, peer_id: &str) -> usize {
        if peer_id == self.self_id {
            return 0;
        }
        let removed = self.remove_owned_by(peer_id);
        if removed > 0 {
            info!("Pool: Purged {} dice of departed peer {}", removed, peer_id);
        }
        removed
    }

    /// Message asking every peer for its staged dice
    pub fn request_sync(&self) -> Message {
        Message::PoolSyncRequest
    }

    /// Answer a sync request with our own dice, if we have any
    pub fn on_sync_requested(&self) -> Option<Message> {
        let own = self.own_dice();
        if own.is_empty() {
            return None;
        }
        Some(Message::PoolSync(own))
    }

    /// Union an incoming sync into the pool. Returns how many dice were added.
    pub fn on_sync_received(&mut self, dice: Vec<Die>) -> usize {
        let mut added = 0;
        for die in dice {
            let known = self.contains(&die.id) || self.retired.contains(&die.id);
            if !is_valid_sides(die.sides) || known {
                continue;
            }
            self.dice.push(die);
            added += 1;
        }
        if added > 0 {
            debug!("Pool: Sync added {} dice", added);
        }
        added
    }

    /// Snapshot and empty the whole pool for a roll
    pub fn take_all(&mut self) -> Vec<Die> {
        let dice = std::mem::take(&mut self.dice);
        for die in &dice {
            self.retired.insert(die.id.clone());
        }
        dice
    }

    /// Dice owned by the local peer
    pub fn own_dice(&self) -> Vec<Die> {
        self.dice
            .iter()
            .filter(|d| d.peer_id == self.self_id)
            .cloned()
            .collect()
    }

    pub fn dice(&self) -> &[Die] {
        &self.dice
    }

    pub fn get(&self, die_id: &DieId) -> Option<&Die> {
        self.dice.iter().find(|d| &d.id == die_id)
    }

    pub fn contains(&self, die_id: &DieId) -> bool {
        self.dice.iter().any(|d| &d.id == die_id)
    }

    pub fn len(&self) -> usize {
        self.dice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dice.is_empty()
    }

    /// Grouped by die size, e.g. `2d6, 1d20`
    pub fn summary(&self) -> String {
        let mut grouped: BTreeMap<u8, usize> = BTreeMap::new();
        for die in &self.dice {
            *grouped.entry(die.sides).or_insert(0) += 1;
        }
        grouped
            .iter()
            .map(|(sides, count)| format!("{}d{}", count, sides))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn remove_owned_by(&mut self, peer_id: &str) -> usize {
        let (removed, kept): (Vec<Die>, Vec<Die>) =
            std::mem::take(&mut self.dice).into_iter().partition(|d| d.peer_id == peer_id);
        self.dice = kept;
        for die in &removed {
            self.retired.insert(die.id.clone());
        }
        removed.len()
    }
}
