//! Room session
//!
//! A single-threaded state machine owning one instance of every component.
//! The host (node, harness or test) feeds it local actions and transport
//! events; it mutates state, broadcasts envelopes and dispatches
//! [`RoomEvent`]s. Nothing here blocks or awaits.
//!
//! Roll sequencing: the roll is broadcast before its animation starts. The
//! host animates the record from `RoomEvent::RollStarted` and reports back
//! through [`RoomSession::finish_roll`]; only then is the record appended to
//! history. A roll arriving while another is still animating supersedes it
//! and the superseded record goes straight into history.

use crate::broadcast::{Broadcaster, Inbound, SendStats};
use crate::config::{DepartedDicePolicy, RoomConfig};
use crate::directory::PeerDirectory;
use crate::error::{PoolError, RenderError, RollError, SettingsError};
use crate::events::{EventRouter, RoomEvent, Subscriber};
use crate::history::RollHistory;
use crate::message::{Envelope, Message};
use crate::pool::DicePool;
use crate::presence::PresenceReconciler;
use crate::render::DiceTheme;
use crate::roll;
use crate::transport::{Transport, TransportEvent};
use crate::types::{
    is_valid_color, is_valid_sides, CursorPos, DiceSettings, Die, DieId, Peer, PeerId, PeerUpdate,
    RollRecord,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Reactions offered by the UI
pub const EMOJIS: [&str; 6] = ["👍", "🎉", "🔥", "😱", "💀", "❤️"];

/// Longest emoji payload accepted, in bytes
const MAX_EMOJI_LEN: usize = 32;

/// Roll ids remembered for duplicate suppression
const RECENT_ROLLS: usize = 128;

/// Inbound counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub received: u64,
    pub applied: u64,
    pub dropped_self_echo: u64,
    pub dropped_foreign_target: u64,
    pub dropped_malformed: u64,
    pub duplicate_rolls: u64,
}

fn validate_emoji(emoji: &str) -> bool {
    !emoji.trim().is_empty() && emoji.len() <= MAX_EMOJI_LEN
}

fn valid_cursor(pos: &CursorPos) -> bool {
    (0.0..=1.0).contains(&pos.x) && (0.0..=1.0).contains(&pos.y)
}

pub struct RoomSession {
    config: RoomConfig,
    directory: PeerDirectory,
    presence: PresenceReconciler,
    pool: DicePool,
    history: RollHistory,
    broadcaster: Broadcaster,
    router: EventRouter,
    rng: StdRng,
    cursor: Option<CursorPos>,
    pending_roll: Option<RollRecord>,
    recent_rolls: VecDeque<String>,
    stats: SessionStats,
    active: bool,
}

impl RoomSession {
    pub fn new(
        config: RoomConfig,
        local: Peer,
        transport: Box<dyn Transport>,
        subscribers: Vec<Box<dyn Subscriber + Send>>,
    ) -> Self {
        let local = local.sanitized();
        let self_id = local.id.clone();
        Self {
            history: RollHistory::new(config.history_capacity),
            directory: PeerDirectory::new(local),
            presence: PresenceReconciler::new(self_id.clone()),
            pool: DicePool::new(self_id.clone()),
            broadcaster: Broadcaster::new(self_id, transport),
            router: EventRouter::new(subscribers),
            rng: StdRng::from_entropy(),
            cursor: None,
            pending_roll: None,
            recent_rolls: VecDeque::with_capacity(RECENT_ROLLS),
            stats: SessionStats::default(),
            active: false,
            config,
        }
    }

    /// Use a deterministic RNG for die ids and faces
    pub fn seeded(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Join the room: announce ourselves and tell the UI
    pub fn init(&mut self) {
        if self.active {
            return;
        }
        self.active = true;
        info!("Session: {} joined room \"{}\"", self.self_id(), self.config.room);

        self.router.dispatch(RoomEvent::Connected {
            room: self.config.room.clone(),
        });
        let local = self.directory.local().clone();
        self.broadcaster.send(&Message::Settings(PeerUpdate::full(&local)));
        self.router.dispatch(RoomEvent::PeerUpdated { peer: local });
    }

    /// Leave the room. Own staged dice are withdrawn first.
    pub fn teardown(&mut self) {
        if !self.active {
            return;
        }
        if let Some(msg) = self.pool.clear_local() {
            self.broadcaster.send(&msg);
            self.pool_changed();
        }
        let delta = self.presence.reset(&mut self.directory);
        for peer_id in delta.left {
            self.router.dispatch(RoomEvent::PeerLeft { peer_id });
        }
        self.pending_roll = None;
        self.active = false;

        info!("Session: {} left room \"{}\"", self.self_id(), self.config.room);
        self.router.dispatch(RoomEvent::Disconnected);
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Envelope(envelope) => self.handle_envelope(envelope),
            TransportEvent::Presence(snapshot) => self.handle_presence(&snapshot),
        }
    }

    pub fn handle_presence(&mut self, snapshot: &[PeerId]) {
        let delta = self.presence.reconcile(snapshot, &mut self.directory);

        for peer_id in delta.left {
            let purge = self.config.departed_dice == DepartedDicePolicy::Purge;
            if purge && self.pool.purge_owner(&peer_id) > 0 {
                self.pool_changed();
            }
            self.router.dispatch(RoomEvent::PeerLeft { peer_id });
        }

        for peer_id in delta.joined {
            self.router.dispatch(RoomEvent::PeerJoined {
                peer_id: peer_id.clone(),
            });
            self.announce_to(&peer_id);
        }
    }

    /// Bring a newly joined peer up to date with our state
    fn announce_to(&mut self, peer_id: &str) {
        let local = self.directory.local().clone();
        self.broadcaster.send_to(peer_id, &Message::Settings(PeerUpdate::full(&local)));

        if let Some(pos) = self.cursor {
            self.broadcaster.send_to(peer_id, &Message::Cursor(pos));
        }
        if let Some(sync) = self.pool.on_sync_requested() {
            self.broadcaster.send_to(peer_id, &sync);
        }
    }

    pub fn handle_envelope(&mut self, envelope: Envelope) {
        self.stats.received += 1;
        let channel = envelope.channel.clone();

        match self.broadcaster.receive(envelope) {
            Inbound::SelfEcho => self.stats.dropped_self_echo += 1,
            Inbound::NotAddressed => self.stats.dropped_foreign_target += 1,
            Inbound::Malformed(e) => self.malformed(&channel, &e.to_string()),
            Inbound::Accepted { from, message } => self.apply(from, message),
        }
    }

    fn malformed(&mut self, channel: &str, reason: &str) {
        self.stats.dropped_malformed += 1;
        warn!("Session: Dropping malformed {} message: {}", channel, reason);
    }

    fn apply(&mut self, from: PeerId, message: Message) {
        let channel = message.channel();
        match message {
            Message::Roll(record) => {
                if let Some(reason) = record.invalid_reason() {
                    return self.malformed(channel.as_str(), &reason);
                }
                if !self.remember_roll(&record.id) {
                    self.stats.duplicate_rolls += 1;
                    debug!("Session: Duplicate roll {}", record.id);
                    return;
                }
                if self.pool.apply_remote_roll(&record.rolled_die_ids) {
                    self.pool_changed();
                }
                self.start_roll(record);
            }
            Message::Settings(update) => {
                if let Some(reason) = update.invalid_reason() {
                    return self.malformed(channel.as_str(), &reason);
                }
                if !self.presence.is_present(&from) {
                    self.presence.track_unlisted(&from);
                }
                let peer = self.directory.upsert(&from, &update).clone();
                self.router.dispatch(RoomEvent::PeerUpdated { peer });
            }
            Message::Emoji(emoji) => {
                if !validate_emoji(&emoji) {
                    return self.malformed(channel.as_str(), "bad emoji");
                }
                self.router.dispatch(RoomEvent::EmojiReceived { peer_id: from, emoji });
            }
            Message::Cursor(pos) => {
                if !valid_cursor(&pos) {
                    return self.malformed(channel.as_str(), "cursor out of range");
                }
                self.router.dispatch(RoomEvent::CursorMoved { peer_id: from, pos });
            }
            Message::PoolAdd(die) => {
                if self.pool.apply_remote_add(die) {
                    self.pool_changed();
                }
            }
            Message::PoolRemove { die_id, peer_id } => {
                if self.pool.apply_remote_remove(&die_id, &peer_id) {
                    self.pool_changed();
                }
            }
            Message::PoolClear { peer_id } => {
                if self.pool.apply_remote_clear(&peer_id) {
                    self.pool_changed();
                }
            }
            Message::PoolSyncRequest => {
                if let Some(sync) = self.pool.on_sync_requested() {
                    self.broadcaster.send_to(&from, &sync);
                }
            }
            Message::PoolSync(dice) => {
                if self.pool.on_sync_received(dice) > 0 {
                    self.pool_changed();
                }
            }
        }
        self.stats.applied += 1;
    }

    /// Returns false when the roll was already seen
    fn remember_roll(&mut self, roll_id: &str) -> bool {
        if self.recent_rolls.iter().any(|id| id == roll_id) || self.history.contains(roll_id) {
            return false;
        }
        if self.recent_rolls.len() == RECENT_ROLLS {
            self.recent_rolls.pop_front();
        }
        self.recent_rolls.push_back(roll_id.to_string());
        true
    }

    // ------------------------------------------------------------------
    // Pool actions
    // ------------------------------------------------------------------

    /// Stage a die of ours
    pub fn add_die(&mut self, sides: u8) -> Result<Die, PoolError> {
        let local = self.directory.local().clone();
        let (die, msg) = self.pool.add_local(sides, &local, &mut self.rng)?;
        self.broadcaster.send(&msg);
        self.pool_changed();
        Ok(die)
    }

    /// Unstage a die by id. Returns false for an unknown id.
    pub fn remove_die(&mut self, die_id: &DieId) -> bool {
        match self.pool.remove_local(die_id) {
            Some(msg) => {
                self.broadcaster.send(&msg);
                self.pool_changed();
                true
            }
            None => false,
        }
    }

    /// Unstage all of our dice
    pub fn clear_dice(&mut self) -> bool {
        match self.pool.clear_local() {
            Some(msg) => {
                self.broadcaster.send(&msg);
                self.pool_changed();
                true
            }
            None => false,
        }
    }

    /// Ask every peer for its staged dice
    pub fn request_sync(&mut self) {
        let msg = self.pool.request_sync();
        self.broadcaster.send(&msg);
    }

    /// Roll the whole pool. `None` when the pool is empty.
    pub fn roll_pool(&mut self) -> Option<RollRecord> {
        let roller = self.self_id().clone();
        let dice = self.pool.take_all();
        let record = roll::roll_pool(&dice, &roller, &mut self.rng)?;
        Some(self.execute_roll(record))
    }

    /// Roll the whole pool with forced faces, one per staged die in order
    pub fn roll_pool_with(&mut self, values: &[u8]) -> Result<Option<RollRecord>, RollError> {
        let record = roll::roll_with_values(self.pool.dice(), self.self_id(), values)?;
        self.pool.take_all();
        Ok(record.map(|r| self.execute_roll(r)))
    }

    /// Replace our staged dice with a single die and roll the pool
    pub fn quick_roll(&mut self, sides: u8) -> Result<Option<RollRecord>, PoolError> {
        if !is_valid_sides(sides) {
            return Err(PoolError::InvalidSides(sides));
        }
        self.clear_dice();
        self.add_die(sides)?;
        Ok(self.roll_pool())
    }

    fn execute_roll(&mut self, record: RollRecord) -> RollRecord {
        info!(
            "Session: Rolled {} dice, total {}",
            record.dice_count(),
            record.overall_total
        );
        self.remember_roll(&record.id);
        self.broadcaster.send(&Message::Roll(record.clone()));
        self.pool_changed();
        self.start_roll(record.clone());
        record
    }

    fn start_roll(&mut self, record: RollRecord) {
        if let Some(previous) = self.pending_roll.take() {
            debug!("Session: Roll {} superseded by {}", previous.id, record.id);
            self.complete_roll(previous);
        }

        let theme = self.theme_for(&record);
        self.pending_roll = Some(record.clone());
        self.router.dispatch(RoomEvent::RollStarted { record, theme });
    }

    fn theme_for(&self, record: &RollRecord) -> DiceTheme {
        match self.directory.get(&record.roller) {
            Some(peer) => DiceTheme::for_peer(peer),
            None => {
                let mut peer = Peer::new(record.roller.clone());
                if let Some(share) = record.results_by_peer.get(&record.roller) {
                    peer.color = share.color.clone();
                }
                DiceTheme::for_peer(&peer)
            }
        }
    }

    /// Animation for `roll_id` ended. Failures still append to history.
    pub fn finish_roll(&mut self, roll_id: &str, result: Result<(), RenderError>) {
        if let Err(e) = &result {
            warn!("Session: Animation for {} failed: {}", roll_id, e);
        }
        match self.pending_roll.take() {
            Some(record) if record.id == roll_id => self.complete_roll(record),
            other => {
                debug!("Session: Ignoring stale animation {}", roll_id);
                self.pending_roll = other;
            }
        }
    }

    fn complete_roll(&mut self, record: RollRecord) {
        self.history.push(record.clone());
        self.router.dispatch(RoomEvent::RollCompleted { record });
    }

    fn pool_changed(&mut self) {
        self.router.dispatch(RoomEvent::PoolChanged {
            size: self.pool.len(),
            summary: self.pool.summary(),
        });
    }

    // ------------------------------------------------------------------
    // Peer actions
    // ------------------------------------------------------------------

    pub fn set_name(&mut self, name: &str) -> Result<(), SettingsError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SettingsError::EmptyName);
        }
        self.apply_local(PeerUpdate::name(name));
        Ok(())
    }

    pub fn set_color(&mut self, color: &str) -> Result<(), SettingsError> {
        if !is_valid_color(color) {
            return Err(SettingsError::InvalidColor(color.to_string()));
        }
        self.apply_local(PeerUpdate::color(color));
        Ok(())
    }

    /// Merge the given dice settings into ours
    pub fn set_dice_settings(&mut self, settings: DiceSettings) -> Result<(), SettingsError> {
        if let Some(label) = &settings.label_color {
            if !is_valid_color(label) {
                return Err(SettingsError::InvalidColor(label.clone()));
            }
        }
        self.apply_local(PeerUpdate::dice_settings(&settings));
        Ok(())
    }

    fn apply_local(&mut self, update: PeerUpdate) {
        let self_id = self.self_id().clone();
        let peer = self.directory.upsert(&self_id, &update).clone();
        self.broadcaster.send(&Message::Settings(update));
        self.router.dispatch(RoomEvent::PeerUpdated { peer });
    }

    pub fn send_emoji(&mut self, emoji: &str) -> Result<(), SettingsError> {
        if !validate_emoji(emoji) {
            return Err(SettingsError::InvalidEmoji);
        }
        self.broadcaster.send(&Message::Emoji(emoji.to_string()));
        self.router.dispatch(RoomEvent::EmojiReceived {
            peer_id: self.self_id().clone(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    /// Move our cursor; coordinates are clamped into the unit square
    pub fn move_cursor(&mut self, x: f64, y: f64) -> Result<CursorPos, SettingsError> {
        let pos = CursorPos::normalized(x, y).ok_or(SettingsError::InvalidCursor)?;
        self.cursor = Some(pos);
        self.broadcaster.send(&Message::Cursor(pos));
        Ok(pos)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn self_id(&self) -> &PeerId {
        self.directory.self_id()
    }

    pub fn local_peer(&self) -> &Peer {
        self.directory.local()
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn pool(&self) -> &DicePool {
        &self.pool
    }

    pub fn history(&self) -> &RollHistory {
        &self.history
    }

    pub fn pending_roll(&self) -> Option<&RollRecord> {
        self.pending_roll.as_ref()
    }

    pub fn cursor(&self) -> Option<CursorPos> {
        self.cursor
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn send_stats(&self) -> SendStats {
        self.broadcaster.stats()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
