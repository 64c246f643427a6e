//! Error types for the dice room core

use thiserror::Error;

/// Wire encoding and decoding failures
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}

/// Local pool mutations that cannot be authored
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("Unsupported die: d{0}")]
    InvalidSides(u8),
}

/// Forced-value roll construction failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RollError {
    #[error("Expected {expected} values, got {actual}")]
    ValueCount { expected: usize, actual: usize },

    #[error("Value {value} out of range for d{sides}")]
    ValueOutOfRange { sides: u8, value: u8 },
}

/// Transport send and setup failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] MessageError),

    #[error("Transport closed")]
    Closed,

    #[error("mDNS error: {0}")]
    Mdns(#[from] mdns_sd::Error),
}

/// Room name cannot be turned into a room id
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomNameError {
    #[error("Room name is empty after sanitizing")]
    Empty,
}

/// Local settings changes that are rejected before broadcast
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Name must not be empty")]
    EmptyName,

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Invalid emoji")]
    InvalidEmoji,

    #[error("Cursor position must be finite")]
    InvalidCursor,
}

/// Dice animation failures; never block the history append
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("Renderer not ready")]
    NotReady,
}

/// Preference store failures
#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error surfaced to the user by a host driving a room session
#[derive(Debug, Error)]
pub enum RoomError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    RoomName(#[from] RoomNameError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Prefs(#[from] PrefsError),
}
