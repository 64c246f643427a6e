//! Local preferences that outlive a session
//!
//! Name, color and dice look are remembered between runs. The file store
//! writes to a temp file and renames it into place.

use crate::error::PrefsError;
use crate::render::{DEFAULT_LABEL_COLOR, DEFAULT_MATERIAL};
use crate::types::{default_peer_name, is_valid_color, DiceSettings, Peer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_COLOR: &str = "#dc143c";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Player name; the peer id prefix is used when unset
    pub name: Option<String>,
    pub color: String,
    pub label_color: String,
    pub material: String,
    pub texture: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            name: None,
            color: DEFAULT_COLOR.to_string(),
            label_color: DEFAULT_LABEL_COLOR.to_string(),
            material: DEFAULT_MATERIAL.to_string(),
            texture: String::new(),
        }
    }
}

impl Preferences {
    pub fn dice_settings(&self) -> DiceSettings {
        let label_color = if is_valid_color(&self.label_color) {
            self.label_color.clone()
        } else {
            DEFAULT_LABEL_COLOR.to_string()
        };
        DiceSettings {
            texture: Some(self.texture.clone()).filter(|t| !t.is_empty()),
            material: Some(self.material.clone()).filter(|m| !m.is_empty()),
            label_color: Some(label_color),
        }
    }

    /// The local peer as these preferences describe it. Unusable stored
    /// values fall back to the defaults.
    pub fn local_peer(&self, id: &str) -> Peer {
        let name = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => default_peer_name(id),
        };
        let color = if is_valid_color(&self.color) {
            self.color.clone()
        } else {
            DEFAULT_COLOR.to_string()
        };
        Peer {
            id: id.to_string(),
            name,
            color,
            dice_settings: self.dice_settings(),
        }
    }
}

/// Key-value persistence for preferences
pub trait PreferenceStore: Send {
    fn load(&self) -> Result<Preferences, PrefsError>;
    fn save(&mut self, prefs: &Preferences) -> Result<(), PrefsError>;
}

/// Store that forgets everything on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    prefs: Option<Preferences>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn load(&self) -> Result<Preferences, PrefsError> {
        Ok(self.prefs.clone().unwrap_or_default())
    }

    fn save(&mut self, prefs: &Preferences) -> Result<(), PrefsError> {
        self.prefs = Some(prefs.clone());
        Ok(())
    }
}

/// JSON file store
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl PreferenceStore for JsonFileStore {
    fn load(&self) -> Result<Preferences, PrefsError> {
        match fs::read_to_string(&self.path) {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Prefs: No file at {}, using defaults", self.path.display());
                Ok(Preferences::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, prefs: &Preferences) -> Result<(), PrefsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write to temp file then rename (atomic)
        let temp_path = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(prefs)?;
        fs::write(&temp_path, &data)?;
        fs::rename(&temp_path, &self.path)?;

        debug!("Prefs: Saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let prefs = Preferences::default();
        let peer = prefs.local_peer("0123456789");
        assert_eq!(peer.name, "01234567");
        assert_eq!(peer.color, "#dc143c");
        assert_eq!(peer.dice_settings.material.as_deref(), Some("plastic"));
        assert_eq!(peer.dice_settings.texture, None);
    }

    #[test]
    fn test_bad_stored_values_fall_back() {
        let prefs = Preferences {
            name: Some("   ".to_string()),
            color: "red".to_string(),
            label_color: "#zzz".to_string(),
            ..Default::default()
        };
        let peer = prefs.local_peer("0123456789");
        assert_eq!(peer.name, "01234567");
        assert_eq!(peer.color, DEFAULT_COLOR);
        assert_eq!(peer.dice_settings.label_color.as_deref(), Some(DEFAULT_LABEL_COLOR));
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert_eq!(store.load().unwrap(), Preferences::default());

        let prefs = Preferences {
            name: Some("Alice".to_string()),
            ..Default::default()
        };
        store.save(&prefs).unwrap();
        assert_eq!(store.load().unwrap(), prefs);
    }

    #[test]
    fn test_file_store_roundtrip() -> Result<(), PrefsError> {
        let dir = tempdir()?;
        let mut store = JsonFileStore::new(dir.path().join("nested").join("prefs.json"));

        assert_eq!(store.load()?, Preferences::default());

        let prefs = Preferences {
            name: Some("Bob".to_string()),
            color: "#00ff00".to_string(),
            material: "metal".to_string(),
            ..Default::default()
        };
        store.save(&prefs)?;

        let reopened = JsonFileStore::new(store.path().clone());
        assert_eq!(reopened.load()?, prefs);
        Ok(())
    }

    #[test]
    fn test_partial_file_fills_defaults() -> Result<(), PrefsError> {
        let dir = tempdir()?;
        let path = dir.path().join("prefs.json");
        fs::write(&path, r#"{"name": "Carol"}"#)?;

        let prefs = JsonFileStore::new(path).load()?;
        assert_eq!(prefs.name.as_deref(), Some("Carol"));
        assert_eq!(prefs.color, DEFAULT_COLOR);
        Ok(())
    }
}
