//! Wire messages for dice room channels
//!
//! Every message travels inside an [`Envelope`] that names the sender, an
//! optional target, the channel and a JSON payload. Payloads are decoded
//! per channel so a bad payload on one channel is rejected on its own.

use crate::error::MessageError;
use crate::types::{CursorPos, Die, DieId, PeerId, PeerUpdate, RollRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Named broadcast channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Roll,
    Settings,
    Emoji,
    Cursor,
    PoolAdd,
    PoolRemove,
    PoolClear,
    PoolSyncRequest,
    PoolSync,
}

impl Channel {
    pub const ALL: [Channel; 9] = [
        Channel::Roll,
        Channel::Settings,
        Channel::Emoji,
        Channel::Cursor,
        Channel::PoolAdd,
        Channel::PoolRemove,
        Channel::PoolClear,
        Channel::PoolSyncRequest,
        Channel::PoolSync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Roll => "roll",
            Channel::Settings => "settings",
            Channel::Emoji => "emoji",
            Channel::Cursor => "cursor",
            Channel::PoolAdd => "pool:add",
            Channel::PoolRemove => "pool:remove",
            Channel::PoolClear => "pool:clear",
            Channel::PoolSyncRequest => "pool:sync:request",
            Channel::PoolSync => "pool:sync",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| MessageError::UnknownChannel(s.to_string()))
    }
}

/// Payload of `pool:remove`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePayload {
    pub die_id: DieId,
    pub peer_id: PeerId,
}

/// Payload of `pool:clear`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearPayload {
    pub peer_id: PeerId,
}

/// Typed channel message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Roll(RollRecord),
    Settings(PeerUpdate),
    Emoji(String),
    Cursor(CursorPos),
    PoolAdd(Die),
    PoolRemove { die_id: DieId, peer_id: PeerId },
    PoolClear { peer_id: PeerId },
    PoolSyncRequest,
    PoolSync(Vec<Die>),
}

impl Message {
    pub fn channel(&self) -> Channel {
        match self {
            Message::Roll(_) => Channel::Roll,
            Message::Settings(_) => Channel::Settings,
            Message::Emoji(_) => Channel::Emoji,
            Message::Cursor(_) => Channel::Cursor,
            Message::PoolAdd(_) => Channel::PoolAdd,
            Message::PoolRemove { .. } => Channel::PoolRemove,
            Message::PoolClear { .. } => Channel::PoolClear,
            Message::PoolSyncRequest => Channel::PoolSyncRequest,
            Message::PoolSync(_) => Channel::PoolSync,
        }
    }

    /// Encode the payload half of the message
    pub fn payload(&self) -> Result<Value, MessageError> {
        let value = match self {
            Message::Roll(record) => serde_json::to_value(record)?,
            Message::Settings(update) => serde_json::to_value(update)?,
            Message::Emoji(emoji) => Value::String(emoji.clone()),
            Message::Cursor(pos) => serde_json::to_value(pos)?,
            Message::PoolAdd(die) => serde_json::to_value(die)?,
            Message::PoolRemove { die_id, peer_id } => serde_json::to_value(RemovePayload {
                die_id: die_id.clone(),
                peer_id: peer_id.clone(),
            })?,
            Message::PoolClear { peer_id } => serde_json::to_value(ClearPayload {
                peer_id: peer_id.clone(),
            })?,
            Message::PoolSyncRequest => Value::Null,
            Message::PoolSync(dice) => serde_json::to_value(dice)?,
        };
        Ok(value)
    }

    /// Decode a payload received on `channel`
    pub fn decode(channel: Channel, payload: Value) -> Result<Self, MessageError> {
        let msg = match channel {
            Channel::Roll => Message::Roll(serde_json::from_value(payload)?),
            Channel::Settings => Message::Settings(serde_json::from_value(payload)?),
            Channel::Emoji => Message::Emoji(serde_json::from_value(payload)?),
            Channel::Cursor => Message::Cursor(serde_json::from_value(payload)?),
            Channel::PoolAdd => Message::PoolAdd(serde_json::from_value(payload)?),
            Channel::PoolRemove => {
                let p: RemovePayload = serde_json::from_value(payload)?;
                Message::PoolRemove {
                    die_id: p.die_id,
                    peer_id: p.peer_id,
                }
            }
            Channel::PoolClear => {
                let p: ClearPayload = serde_json::from_value(payload)?;
                Message::PoolClear { peer_id: p.peer_id }
            }
            Channel::PoolSyncRequest => Message::PoolSyncRequest,
            Channel::PoolSync => Message::PoolSync(serde_json::from_value(payload)?),
        };
        Ok(msg)
    }
}

/// Wire envelope shared by every channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender of the message
    pub peer_id: PeerId,
    /// Set for directed messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_peer_id: Option<PeerId>,
    pub channel: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(
        peer_id: PeerId,
        target_peer_id: Option<PeerId>,
        message: &Message,
    ) -> Result<Self, MessageError> {
        Ok(Self {
            peer_id,
            target_peer_id,
            channel: message.channel().as_str().to_string(),
            payload: message.payload()?,
        })
    }

    /// Decode the channel and payload into a typed message
    pub fn message(&self) -> Result<Message, MessageError> {
        let channel: Channel = self.channel.parse()?;
        Message::decode(channel, self.payload.clone())
    }

    /// Serialize envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
