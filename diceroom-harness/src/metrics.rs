//! Convergence metrics collection
//!
//! Counts delivered messages per channel, operations and rolls, and records
//! which peers ended up with a pool that differs from the majority.

use crate::fault_injection::FaultStats;
use diceroom_core::PeerId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Metrics collected over one simulation run
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Delivered copies by channel
    pub message_counts: BTreeMap<String, u64>,
    /// Local operations performed
    pub operations: u64,
    /// Rolls executed by their roller
    pub rolls: u64,
    /// Delivery rounds until quiescence, summed over the run
    pub delivery_rounds: u64,
    /// Fault counters at the end of the run
    pub faults: FaultStats,
    /// Peers whose pool differs from the majority at the end
    pub diverging_peers: Vec<PeerId>,
    /// Peers present at the end
    pub peers: usize,
    start_time: Option<Instant>,
    elapsed: Option<Duration>,
}

/// Summary statistics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub peers: usize,
    pub operations: u64,
    pub rolls: u64,
    pub delivered: u64,
    pub delivery_rounds: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub garbage: u64,
    pub converged: bool,
    pub diverging: usize,
    pub duration_ms: u64,
    pub ops_per_sec: f64,
}

/// Full metrics export format
#[derive(Debug, Clone, Serialize)]
pub struct MetricsExport {
    pub scenario: String,
    pub generated_at: String,
    pub message_counts: BTreeMap<String, u64>,
    pub diverging_peers: Vec<PeerId>,
    pub summary: MetricsSummary,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
        self.elapsed = None;
    }

    /// Stop timing
    pub fn finish(&mut self) {
        if let Some(start) = self.start_time {
            self.elapsed = Some(start.elapsed());
        }
    }

    /// Increment message count
    pub fn count_message(&mut self, channel: &str) {
        *self.message_counts.entry(channel.to_string()).or_insert(0) += 1;
    }

    pub fn count_operation(&mut self) {
        self.operations += 1;
    }

    pub fn count_roll(&mut self) {
        self.rolls += 1;
    }

    /// Record the convergence check
    pub fn record_convergence(&mut self, peers: usize, diverging: Vec<PeerId>) {
        self.peers = peers;
        self.diverging_peers = diverging;
    }

    pub fn converged(&self) -> bool {
        self.diverging_peers.is_empty()
    }

    fn duration(&self) -> Duration {
        match (self.elapsed, self.start_time) {
            (Some(elapsed), _) => elapsed,
            (None, Some(start)) => start.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    /// Calculate summary statistics
    pub fn summary(&self) -> MetricsSummary {
        let duration = self.duration();
        let ops_per_sec = if duration.as_secs_f64() > 0.0 {
            self.operations as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            peers: self.peers,
            operations: self.operations,
            rolls: self.rolls,
            delivered: self.message_counts.values().sum(),
            delivery_rounds: self.delivery_rounds,
            dropped: self.faults.dropped,
            duplicated: self.faults.duplicated,
            garbage: self.faults.garbage,
            converged: self.converged(),
            diverging: self.diverging_peers.len(),
            duration_ms: duration.as_millis() as u64,
            ops_per_sec,
        }
    }

    /// Export as JSON string
    pub fn export_json(&self, scenario: &str) -> String {
        let export = MetricsExport {
            scenario: scenario.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            message_counts: self.message_counts.clone(),
            diverging_peers: self.diverging_peers.clone(),
            summary: self.summary(),
        };
        serde_json::to_string_pretty(&export).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_counts() {
        let mut metrics = Metrics::new();
        metrics.count_message("pool:add");
        metrics.count_message("pool:add");
        metrics.count_message("roll");

        assert_eq!(metrics.message_counts["pool:add"], 2);
        assert_eq!(metrics.summary().delivered, 3);
    }

    #[test]
    fn test_convergence_summary() {
        let mut metrics = Metrics::new();
        metrics.start();
        metrics.count_operation();
        metrics.count_roll();
        metrics.record_convergence(3, vec!["peer-2".to_string()]);
        metrics.finish();

        let summary = metrics.summary();
        assert!(!summary.converged);
        assert_eq!(summary.diverging, 1);
        assert_eq!(summary.peers, 3);
        assert_eq!(summary.rolls, 1);
    }

    #[test]
    fn test_export_json() {
        let mut metrics = Metrics::new();
        metrics.count_message("emoji");
        metrics.record_convergence(2, Vec::new());

        let json = metrics.export_json("happy");
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["scenario"], "happy");
        assert_eq!(parsed["summary"]["converged"], true);
        assert_eq!(parsed["message_counts"]["emoji"], 1);
    }
}
