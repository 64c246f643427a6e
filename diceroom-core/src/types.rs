//! Core types for the dice room protocol

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier for a connected session
pub type PeerId = String;

/// Supported die sizes
pub const DICE_TYPES: [u8; 7] = [2, 4, 6, 8, 10, 12, 20];

/// Color used for peers that have not announced one yet
pub const DEFAULT_PEER_COLOR: &str = "#ffffff";

/// Length of the id prefix used as a placeholder name
const DEFAULT_NAME_LEN: usize = 8;

/// Generate a fresh peer id for this session
pub fn new_peer_id() -> PeerId {
    uuid::Uuid::new_v4().to_string()
}

/// Placeholder name derived from a peer id
pub fn default_peer_name(id: &str) -> String {
    id.chars().take(DEFAULT_NAME_LEN).collect()
}

/// Check whether a die size is supported
pub fn is_valid_sides(sides: u8) -> bool {
    DICE_TYPES.contains(&sides)
}

/// Check for `#rgb` or `#rrggbb`
pub fn is_valid_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => {
            (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// Current Unix timestamp in milliseconds
pub fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Partial-update field.
///
/// Absent on the wire means `Keep`, an explicit `null` means `Clear`
/// (reset to the default), anything else is `Set`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Field<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Field<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Field::Keep)
    }

    /// Apply to an optional value: `Set` replaces, `Clear` unsets
    fn apply_to(&self, target: &mut Option<T>)
    where
        T: Clone,
    {
        match self {
            Field::Set(v) => *target = Some(v.clone()),
            Field::Clear => *target = None,
            Field::Keep => {}
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Set(v) => v.serialize(serializer),
            Field::Keep | Field::Clear => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Field::Set(v),
            None => Field::Clear,
        })
    }
}

/// Visual settings a peer uses for its dice
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_color: Option<String>,
}

impl DiceSettings {
    /// Apply a partial update field by field
    pub fn apply(&mut self, update: &DiceSettingsUpdate) {
        update.texture.apply_to(&mut self.texture);
        update.material.apply_to(&mut self.material);
        update.label_color.apply_to(&mut self.label_color);
    }
}

/// Partial dice settings; same absent/`null`/value rules as [`PeerUpdate`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceSettingsUpdate {
    #[serde(default, skip_serializing_if = "Field::is_keep")]
    pub texture: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_keep")]
    pub material: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_keep")]
    pub label_color: Field<String>,
}

impl DiceSettingsUpdate {
    /// Set the fields present in `settings`, keep the rest
    pub fn merge(settings: &DiceSettings) -> Self {
        let field = |v: &Option<String>| v.clone().map_or(Field::Keep, Field::Set);
        Self {
            texture: field(&settings.texture),
            material: field(&settings.material),
            label_color: field(&settings.label_color),
        }
    }

    /// Exact replacement: unset fields are cleared
    pub fn replace(settings: &DiceSettings) -> Self {
        let field = |v: &Option<String>| v.clone().map_or(Field::Clear, Field::Set);
        Self {
            texture: field(&settings.texture),
            material: field(&settings.material),
            label_color: field(&settings.label_color),
        }
    }
}

/// A participant in the room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub name: String,
    pub color: String,
    pub dice_settings: DiceSettings,
}

impl Peer {
    /// Placeholder peer with default name and color
    pub fn new(id: PeerId) -> Self {
        Self {
            name: default_peer_name(&id),
            color: DEFAULT_PEER_COLOR.to_string(),
            dice_settings: DiceSettings::default(),
            id,
        }
    }

    /// Replace an empty name or a malformed color with the defaults, so
    /// announcements of this peer pass validation at the receivers
    pub fn sanitized(mut self) -> Self {
        if self.name.trim().is_empty() {
            self.name = default_peer_name(&self.id);
        }
        if !is_valid_color(&self.color) {
            self.color = DEFAULT_PEER_COLOR.to_string();
        }
        if !self.dice_settings.label_color.as_deref().map_or(true, is_valid_color) {
            self.dice_settings.label_color = None;
        }
        self
    }

    /// Merge a partial update into this peer
    pub fn apply(&mut self, update: &PeerUpdate) {
        match &update.name {
            Field::Set(name) => self.name = name.clone(),
            Field::Clear => self.name = default_peer_name(&self.id),
            Field::Keep => {}
        }
        match &update.color {
            Field::Set(color) => self.color = color.clone(),
            Field::Clear => self.color = DEFAULT_PEER_COLOR.to_string(),
            Field::Keep => {}
        }
        match &update.dice_settings {
            Field::Set(settings) => self.dice_settings.apply(settings),
            Field::Clear => self.dice_settings = DiceSettings::default(),
            Field::Keep => {}
        }
    }
}

/// Partial peer attributes, as carried on the `settings` channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerUpdate {
    #[serde(default, skip_serializing_if = "Field::is_keep")]
    pub name: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_keep")]
    pub color: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_keep")]
    pub dice_settings: Field<DiceSettingsUpdate>,
}

impl PeerUpdate {
    /// Every attribute of `peer`, used for (re)announcements
    pub fn full(peer: &Peer) -> Self {
        Self {
            name: Field::Set(peer.name.clone()),
            color: Field::Set(peer.color.clone()),
            dice_settings: Field::Set(DiceSettingsUpdate::replace(&peer.dice_settings)),
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Field::Set(name.into()),
            ..Default::default()
        }
    }

    pub fn color(color: impl Into<String>) -> Self {
        Self {
            color: Field::Set(color.into()),
            ..Default::default()
        }
    }

    /// Set the given dice settings, keeping the ones left unset
    pub fn dice_settings(settings: &DiceSettings) -> Self {
        Self {
            dice_settings: Field::Set(DiceSettingsUpdate::merge(settings)),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_keep() && self.color.is_keep() && self.dice_settings.is_keep()
    }

    /// Reason this update is malformed, if it is
    pub fn invalid_reason(&self) -> Option<String> {
        if let Field::Set(name) = &self.name {
            if name.trim().is_empty() {
                return Some("empty name".to_string());
            }
        }
        if let Field::Set(color) = &self.color {
            if !is_valid_color(color) {
                return Some(format!("bad color {:?}", color));
            }
        }
        if let Field::Set(settings) = &self.dice_settings {
            if let Field::Set(label) = &settings.label_color {
                if !is_valid_color(label) {
                    return Some(format!("bad label color {:?}", label));
                }
            }
        }
        None
    }
}

/// Unique identifier of a staged die
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DieId(String);

impl DieId {
    /// High-resolution timestamp plus a random suffix
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        DieId(format!("{}.{:08x}", nanos, rng.gen::<u32>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DieId {
    fn from(s: &str) -> Self {
        DieId(s.to_string())
    }
}

impl From<String> for DieId {
    fn from(s: String) -> Self {
        DieId(s)
    }
}

impl fmt::Display for DieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A staged, unrolled die. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Die {
    pub id: DieId,
    pub sides: u8,
    pub peer_id: PeerId,
    /// Owner name at the time the die was added
    pub player_name: String,
    /// Owner color at the time the die was added
    pub color: String,
}

/// Face value of one rolled die
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieResult {
    pub sides: u8,
    pub value: u8,
}

/// One peer's share of a roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRoll {
    pub player_name: String,
    pub color: String,
    pub dice: Vec<u8>,
    pub results: Vec<DieResult>,
    pub total: u32,
}

/// Immutable outcome of rolling a pool snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollRecord {
    pub id: String,
    pub timestamp: i64,
    /// Peer that triggered the roll and generated the values
    pub roller: PeerId,
    pub results_by_peer: BTreeMap<PeerId, PeerRoll>,
    pub overall_total: u32,
    pub is_group_roll: bool,
    pub rolled_die_ids: Vec<DieId>,
}

impl RollRecord {
    /// Number of dice in the roll
    pub fn dice_count(&self) -> usize {
        self.results_by_peer.values().map(|p| p.results.len()).sum()
    }

    /// Reason this record is inconsistent, if it is
    pub fn invalid_reason(&self) -> Option<String> {
        if self.results_by_peer.is_empty() {
            return Some("no results".to_string());
        }

        let mut overall = 0u32;
        for (peer_id, roll) in &self.results_by_peer {
            if roll.dice.len() != roll.results.len() {
                return Some(format!("dice/results length mismatch for {}", peer_id));
            }
            let mut total = 0u32;
            for (sides, result) in roll.dice.iter().zip(&roll.results) {
                if *sides != result.sides || !is_valid_sides(result.sides) {
                    return Some(format!("bad die d{} for {}", result.sides, peer_id));
                }
                if result.value == 0 || result.value > result.sides {
                    return Some(format!(
                        "value {} out of range for d{}",
                        result.value, result.sides
                    ));
                }
                total += u32::from(result.value);
            }
            if total != roll.total {
                return Some(format!("subtotal mismatch for {}", peer_id));
            }
            overall += total;
        }

        if overall != self.overall_total {
            return Some("overall total mismatch".to_string());
        }
        if self.is_group_roll != (self.results_by_peer.len() > 1) {
            return Some("group flag mismatch".to_string());
        }
        None
    }
}

/// Normalized cursor position, `[x, y]` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct CursorPos {
    pub x: f64,
    pub y: f64,
}

impl CursorPos {
    /// Clamp into the unit square; `None` for non-finite input
    pub fn normalized(x: f64, y: f64) -> Option<Self> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        Some(Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        })
    }
}

impl From<(f64, f64)> for CursorPos {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<CursorPos> for (f64, f64) {
    fn from(pos: CursorPos) -> Self {
        (pos.x, pos.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_defaults() {
        let peer = Peer::new("0123456789abcdef".to_string());
        assert_eq!(peer.name, "01234567");
        assert_eq!(peer.color, DEFAULT_PEER_COLOR);
        assert_eq!(peer.dice_settings, DiceSettings::default());
    }

    #[test]
    fn test_partial_update_merges() {
        let mut peer = Peer::new("abc".to_string());
        peer.apply(&PeerUpdate::name("Alice"));
        peer.apply(&PeerUpdate::color("#dc143c"));
        peer.apply(&PeerUpdate::dice_settings(&DiceSettings {
            material: Some("metal".to_string()),
            ..Default::default()
        }));
        peer.apply(&PeerUpdate::dice_settings(&DiceSettings {
            texture: Some("marble".to_string()),
            ..Default::default()
        }));

        assert_eq!(peer.name, "Alice");
        assert_eq!(peer.color, "#dc143c");
        assert_eq!(peer.dice_settings.material.as_deref(), Some("metal"));
        assert_eq!(peer.dice_settings.texture.as_deref(), Some("marble"));
    }

    #[test]
    fn test_explicit_null_resets_field() {
        let mut peer = Peer::new("abcdefghij".to_string());
        peer.apply(&PeerUpdate::name("Bob"));
        peer.apply(&PeerUpdate::color("#123456"));

        let update: PeerUpdate = serde_json::from_str(r#"{"name": null}"#).unwrap();
        assert_eq!(update.name, Field::Clear);
        assert!(update.color.is_keep());

        peer.apply(&update);
        assert_eq!(peer.name, "abcdefgh");
        assert_eq!(peer.color, "#123456");
    }

    #[test]
    fn test_nested_null_resets_dice_setting() {
        let mut peer = Peer::new("abc".to_string());
        peer.apply(&PeerUpdate::dice_settings(&DiceSettings {
            material: Some("metal".to_string()),
            texture: Some("marble".to_string()),
            label_color: None,
        }));

        let json = r#"{"dice_settings": {"material": null}}"#;
        let update: PeerUpdate = serde_json::from_str(json).unwrap();
        peer.apply(&update);
        assert_eq!(peer.dice_settings.material, None);
        assert_eq!(peer.dice_settings.texture.as_deref(), Some("marble"));
    }

    #[test]
    fn test_full_update_replaces_dice_settings() {
        let mut remote = Peer::new("abc".to_string());
        remote.dice_settings.texture = Some("marble".to_string());

        let mut local = Peer::new("abc".to_string());
        local.dice_settings.material = Some("glass".to_string());
        remote.apply(&PeerUpdate::full(&local));

        assert_eq!(remote.dice_settings, local.dice_settings);
    }

    #[test]
    fn test_sanitized_peer() {
        let mut peer = Peer::new("0123456789".to_string());
        peer.name = "  ".to_string();
        peer.color = "red".to_string();
        peer.dice_settings.label_color = Some("white".to_string());

        let peer = peer.sanitized();
        assert_eq!(peer.name, "01234567");
        assert_eq!(peer.color, DEFAULT_PEER_COLOR);
        assert_eq!(peer.dice_settings.label_color, None);
        assert!(PeerUpdate::full(&peer).invalid_reason().is_none());
    }

    #[test]
    fn test_update_wire_shape() {
        let json = serde_json::to_value(PeerUpdate::name("Carol")).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Carol"}));
    }

    #[test]
    fn test_invalid_updates() {
        assert!(PeerUpdate::name("   ").invalid_reason().is_some());
        assert!(PeerUpdate::color("red").invalid_reason().is_some());
        assert!(PeerUpdate::color("#abc").invalid_reason().is_none());
        assert!(PeerUpdate::full(&Peer::new("x".to_string())).invalid_reason().is_none());
    }

    #[test]
    fn test_die_ids_unique() {
        let mut rng = rand::thread_rng();
        let a = DieId::generate(&mut rng);
        let b = DieId::generate(&mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn test_cursor_wire_shape() {
        let pos = CursorPos::normalized(0.25, 1.5).unwrap();
        assert_eq!(pos.y, 1.0);
        assert_eq!(serde_json::to_value(pos).unwrap(), serde_json::json!([0.25, 1.0]));
        assert!(CursorPos::normalized(f64::NAN, 0.0).is_none());
    }
}
