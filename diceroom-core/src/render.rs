//! Dice renderer seam
//!
//! The renderer is a black box that animates `(sides, value)` pairs in a
//! theme and resolves when done. [`RollPlayer`] runs one animation at a time
//! and reports completions back to the host loop.

use crate::error::RenderError;
use crate::types::{DieResult, Peer, RollRecord};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_LABEL_COLOR: &str = "#ffffff";
pub const DEFAULT_MATERIAL: &str = "plastic";

/// Visual theme for one roll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceTheme {
    pub color: String,
    pub label_color: String,
    pub material: String,
    pub texture: String,
}

impl DiceTheme {
    /// Theme of a peer, falling back to renderer defaults
    pub fn for_peer(peer: &Peer) -> Self {
        let settings = &peer.dice_settings;
        Self {
            color: peer.color.clone(),
            label_color: settings
                .label_color
                .clone()
                .unwrap_or_else(|| DEFAULT_LABEL_COLOR.to_string()),
            material: settings
                .material
                .clone()
                .unwrap_or_else(|| DEFAULT_MATERIAL.to_string()),
            texture: settings.texture.clone().unwrap_or_default(),
        }
    }
}

/// Forced-result notation, e.g. `1d6+1d20@3,17`
pub fn notation(record: &RollRecord) -> String {
    let results: Vec<&DieResult> =
        record.results_by_peer.values().flat_map(|p| &p.results).collect();
    let dice = results
        .iter()
        .map(|r| format!("1d{}", r.sides))
        .collect::<Vec<_>>()
        .join("+");
    let values = results
        .iter()
        .map(|r| r.value.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("{}@{}", dice, values)
}

pub trait DiceRenderer: Send + Sync + 'static {
    /// Animate the given results; resolves when the animation ends
    fn render(
        &self,
        theme: DiceTheme,
        notation: String,
    ) -> impl Future<Output = Result<(), RenderError>> + Send;
}

/// Renderer for headless peers: logs the roll and waits out the animation
pub struct LogRenderer {
    duration: Duration,
}

impl LogRenderer {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl DiceRenderer for LogRenderer {
    async fn render(&self, theme: DiceTheme, notation: String) -> Result<(), RenderError> {
        info!("Render: Rolling {} in {} {}", notation, theme.color, theme.material);
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

/// Completion report for one animation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    pub roll_id: String,
    pub result: Result<(), RenderError>,
}

/// Runs at most one animation; a new roll aborts the running one
pub struct RollPlayer<R> {
    renderer: Arc<R>,
    current: Option<(String, JoinHandle<()>)>,
    done: mpsc::UnboundedSender<RenderOutcome>,
}

impl<R: DiceRenderer> RollPlayer<R> {
    pub fn new(renderer: R) -> (Self, mpsc::UnboundedReceiver<RenderOutcome>) {
        let (done, done_rx) = mpsc::unbounded_channel();
        let player = Self {
            renderer: Arc::new(renderer),
            current: None,
            done,
        };
        (player, done_rx)
    }

    /// Start animating `record`. Returns the id of the roll it superseded.
    pub fn play(&mut self, record: &RollRecord, theme: DiceTheme) -> Option<String> {
        let superseded = self.abort();

        let roll_id = record.id.clone();
        let notation = notation(record);
        let renderer = self.renderer.clone();
        let done = self.done.clone();
        let id = roll_id.clone();

        debug!("Render: Starting {}", notation);
        let handle = tokio::spawn(async move {
            let result = renderer.render(theme, notation).await;
            if let Err(e) = &result {
                warn!("Render: Roll {} failed: {}", id, e);
            }
            let _ = done.send(RenderOutcome { roll_id: id, result });
        });

        self.current = Some((roll_id, handle));
        superseded
    }

    /// Abort the running animation, if any
    pub fn abort(&mut self) -> Option<String> {
        let (roll_id, handle) = self.current.take()?;
        if handle.is_finished() {
            return None;
        }
        handle.abort();
        debug!("Render: Superseded {}", roll_id);
        Some(roll_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PeerRoll;
    use std::collections::BTreeMap;

    fn record(id: &str, results: &[(u8, u8)]) -> RollRecord {
        let mut results_by_peer = BTreeMap::new();
        results_by_peer.insert(
            "a".to_string(),
            PeerRoll {
                player_name: "A".to_string(),
                color: "#ffffff".to_string(),
                dice: results.iter().map(|(s, _)| *s).collect(),
                results: results.iter().map(|&(sides, value)| DieResult { sides, value }).collect(),
                total: results.iter().map(|(_, v)| u32::from(*v)).sum(),
            },
        );
        RollRecord {
            id: id.to_string(),
            timestamp: 0,
            roller: "a".to_string(),
            results_by_peer,
            overall_total: results.iter().map(|(_, v)| u32::from(*v)).sum(),
            is_group_roll: false,
            rolled_die_ids: Vec::new(),
        }
    }

    struct Failing;

    impl DiceRenderer for Failing {
        async fn render(&self, _theme: DiceTheme, _notation: String) -> Result<(), RenderError> {
            Err(RenderError::NotReady)
        }
    }

    #[test]
    fn test_notation() {
        assert_eq!(notation(&record("r", &[(6, 3), (6, 5)])), "1d6+1d6@3,5");
    }

    #[test]
    fn test_theme_defaults() {
        let theme = DiceTheme::for_peer(&Peer::new("a".to_string()));
        assert_eq!(theme.material, "plastic");
        assert_eq!(theme.label_color, "#ffffff");
        assert_eq!(theme.texture, "");
    }

    #[tokio::test]
    async fn test_completion_reported() {
        let (mut player, mut done) = RollPlayer::new(LogRenderer::new(Duration::from_millis(1)));
        let theme = DiceTheme::for_peer(&Peer::new("a".to_string()));

        assert!(player.play(&record("r1", &[(20, 7)]), theme).is_none());
        let outcome = done.recv().await.unwrap();
        assert_eq!(outcome.roll_id, "r1");
        assert!(outcome.result.is_ok());
    }

    #[tokio::test]
    async fn test_failure_reported() {
        let (mut player, mut done) = RollPlayer::new(Failing);
        let theme = DiceTheme::for_peer(&Peer::new("a".to_string()));

        player.play(&record("r1", &[(4, 1)]), theme);
        assert_eq!(done.recv().await.unwrap().result, Err(RenderError::NotReady));
    }

    #[tokio::test]
    async fn test_new_roll_supersedes_running_one() {
        let (mut player, mut done) = RollPlayer::new(LogRenderer::new(Duration::from_secs(60)));
        let theme = DiceTheme::for_peer(&Peer::new("a".to_string()));

        player.play(&record("r1", &[(6, 1)]), theme.clone());
        let superseded = player.play(&record("r2", &[(6, 2)]), theme);
        assert_eq!(superseded.as_deref(), Some("r1"));

        player.abort();
        assert!(tokio::time::timeout(Duration::from_millis(50), done.recv()).await.is_err());
    }
}
