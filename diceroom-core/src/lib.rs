//! Dice Room Core Library
//!
//! Peer-state synchronization and dice-pool replication for multiplayer
//! dice rooms. Peers converge on a shared pool of staged dice over a
//! best-effort broadcast transport, with mDNS presence and UDP delivery.

pub mod broadcast;
pub mod config;
pub mod directory;
pub mod discovery;
pub mod error;
pub mod events;
pub mod history;
pub mod memory;
pub mod message;
pub mod pool;
pub mod prefs;
pub mod presence;
pub mod render;
pub mod roll;
pub mod room;
pub mod session;
pub mod transport;
pub mod types;

pub use types::*;
pub use broadcast::{Broadcaster, Inbound, SendStats};
pub use config::{DepartedDicePolicy, RoomConfig, TransportConfig};
pub use directory::PeerDirectory;
pub use discovery::{Discovery, PeerBook, PeerInfo};
pub use error::{
    MessageError, PoolError, PrefsError, RenderError, RollError, RoomError, RoomNameError,
    SettingsError, TransportError,
};
pub use events::{EventRouter, Recorder, RoomEvent, Subscriber};
pub use history::RollHistory;
pub use memory::{MemoryHub, MemoryTransport, Routed};
pub use message::{Channel, Envelope, Message};
pub use pool::DicePool;
pub use prefs::{JsonFileStore, MemoryStore, PreferenceStore, Preferences};
pub use presence::{PresenceDelta, PresenceReconciler};
pub use render::{DiceRenderer, DiceTheme, LogRenderer, RenderOutcome, RollPlayer};
pub use session::{RoomSession, SessionStats, EMOJIS};
pub use transport::{LocalOnly, Transport, TransportEvent, UdpTransport};
