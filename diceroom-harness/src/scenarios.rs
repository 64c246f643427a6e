//! Predefined convergence scenarios
//!
//! A scenario combines:
//! - Cluster size and late joiners
//! - Workload generation
//! - Fault injection
//! - A convergence verdict

use crate::cluster::Cluster;
use crate::fault_injection::{FaultConfig, FaultInjector, FaultScenario};
use crate::metrics::Metrics;
use crate::workload::{WorkloadConfig, WorkloadGenerator};
use diceroom_core::PeerId;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

/// Delivery rounds allowed before a batch counts as stuck
const MAX_ROUNDS: usize = 64;

/// Errors from scenario execution
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Scenario task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Scenario configuration
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub name: String,
    pub description: String,
    pub faults: FaultConfig,
    pub workload: WorkloadConfig,
    pub peers: usize,
    /// Peers that join halfway through the workload
    pub late_joiners: usize,
    /// Operations each peer performs before the round is delivered
    pub burst: usize,
    pub must_converge: bool,
}

impl ScenarioConfig {
    /// Ad-hoc scenario from command line parameters
    pub fn custom(
        peers: usize,
        late_joiners: usize,
        burst: usize,
        faults: FaultConfig,
    ) -> Result<Self, ScenarioError> {
        if peers == 0 {
            return Err(ScenarioError::InvalidParameter("need at least one peer".to_string()));
        }
        if burst == 0 {
            return Err(ScenarioError::InvalidParameter("burst must be at least 1".to_string()));
        }
        let rates = [
            ("loss", faults.message_loss_rate),
            ("duplicate", faults.duplicate_rate),
        ];
        for (name, rate) in rates {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ScenarioError::InvalidParameter(format!(
                    "{} rate {} not in 0..1",
                    name, rate
                )));
            }
        }
        let must_converge = faults.is_lossless();
        Ok(Self {
            name: "custom".to_string(),
            description: "Command line parameters".to_string(),
            faults,
            workload: WorkloadConfig::default(),
            peers,
            late_joiners,
            burst,
            must_converge,
        })
    }

    fn named(name: &str, description: &str, scenario: FaultScenario, late_joiners: usize) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            faults: scenario.config(),
            workload: WorkloadConfig::default(),
            peers: scenario.recommended_peers(),
            late_joiners,
            burst: 1,
            must_converge: scenario.must_converge(),
        }
    }

    fn with_burst(mut self, burst: usize) -> Self {
        self.burst = burst;
        self
    }
}

/// Scenario execution results
#[derive(Debug, Clone)]
pub struct ScenarioResults {
    pub scenario: String,
    pub seed: u64,
    pub converged: bool,
    pub must_converge: bool,
    pub diverging_peers: Vec<PeerId>,
    pub duration_ms: u64,
    pub metrics: Metrics,
}

impl ScenarioResults {
    /// Whether the verdict is acceptable for this scenario
    pub fn passed(&self) -> bool {
        self.converged || !self.must_converge
    }
}

/// Test suite results
#[derive(Debug, Clone)]
pub struct SuiteResults {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<(String, ScenarioResults, bool)>,
}

impl SuiteResults {
    /// Generate JUnit XML report
    pub fn to_junit_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!(
            "<testsuite name=\"Dice Room Convergence\" tests=\"{}\" failures=\"{}\" \
             errors=\"0\">\n",
            self.total, self.failed
        ));

        for (name, result, passed) in &self.results {
            xml.push_str(&format!(
                "  <testcase name=\"{}\" time=\"{:.3}\"",
                name,
                result.duration_ms as f64 / 1000.0
            ));

            if *passed {
                xml.push_str(" />\n");
            } else {
                xml.push_str(">\n");
                xml.push_str(&format!(
                    "    <failure message=\"{} of {} peers diverged\"/>\n",
                    result.diverging_peers.len(),
                    result.metrics.peers
                ));
                xml.push_str("  </testcase>\n");
            }
        }

        xml.push_str("</testsuite>\n");
        xml
    }
}

/// Get a predefined scenario by name
pub fn get_scenario(name: &str) -> Result<ScenarioConfig, ScenarioError> {
    match name.to_lowercase().as_str() {
        "happy" | "none" => Ok(ScenarioConfig::named(
            "happy",
            "No faults - baseline test",
            FaultScenario::None,
            0,
        )),
        "lossy" => Ok(ScenarioConfig::named(
            "lossy",
            "10% message loss with duplicates and reordering - divergence expected",
            FaultScenario::Lossy,
            0,
        )),
        "duplicates" => Ok(ScenarioConfig::named(
            "duplicates",
            "Duplicated and garbage copies, self-echo, reordered links",
            FaultScenario::Duplicates,
            0,
        )),
        "late-join" => Ok(ScenarioConfig::named(
            "late-join",
            "Two peers join halfway and must catch up on the pool",
            FaultScenario::LateJoin,
            2,
        )),
        "bursts" => Ok(ScenarioConfig::named(
            "bursts",
            "Several operations per peer between deliveries, racing across links",
            FaultScenario::Duplicates,
            0,
        )
        .with_burst(4)),
        _ => Err(ScenarioError::UnknownScenario(name.to_string())),
    }
}

/// List all available scenarios
pub fn list_scenarios() -> Vec<&'static str> {
    vec!["happy", "lossy", "duplicates", "late-join", "bursts"]
}

/// Run a scenario to completion and check convergence
pub fn run_scenario(config: &ScenarioConfig, operations: usize, seed: u64) -> ScenarioResults {
    let start = Instant::now();
    let mut metrics = Metrics::new();
    metrics.start();

    let mut cluster = Cluster::new(config.peers, seed);
    let mut injector = FaultInjector::new(config.faults.clone(), seed ^ 0xfa17);
    let mut workload = WorkloadGenerator::new(config.workload.clone(), seed ^ 0x0b5);

    cluster.set_echo(config.faults.echo);
    cluster.announce_presence();
    cluster.run_to_quiescence(&mut injector, &mut metrics, MAX_ROUNDS);

    let late_join_at = operations / 2;
    let mut late_joiners = config.late_joiners;
    let mut performed = 0;

    // Every peer acts `burst` times per round, then the round is delivered
    while performed < operations {
        for peer_id in cluster.peer_ids() {
            for _ in 0..config.burst {
                if performed == operations {
                    break;
                }
                let op = workload.next();
                cluster.perform(&peer_id, &op, &mut metrics);
                performed += 1;
            }
        }
        cluster.run_to_quiescence(&mut injector, &mut metrics, MAX_ROUNDS);
        cluster.finish_animations();

        if late_joiners > 0 && performed >= late_join_at {
            let joined: Vec<PeerId> = (0..late_joiners).map(|_| cluster.add_peer()).collect();
            info!(
                "Scenario {}: {} late joiners after {} operations",
                config.name,
                joined.len(),
                performed
            );
            cluster.announce_presence();
            cluster.run_to_quiescence(&mut injector, &mut metrics, MAX_ROUNDS);

            for peer_id in &joined {
                if let Some(session) = cluster.session_mut(peer_id) {
                    session.request_sync();
                }
            }
            cluster.run_to_quiescence(&mut injector, &mut metrics, MAX_ROUNDS);
            late_joiners = 0;
        }
    }

    cluster.run_to_quiescence(&mut injector, &mut metrics, MAX_ROUNDS);
    cluster.finish_animations();

    let diverging = cluster.diverging_peers();
    metrics.faults = injector.stats();
    metrics.record_convergence(cluster.len(), diverging.clone());
    metrics.finish();

    let converged = diverging.is_empty();
    if converged {
        info!("Scenario {}: {} peers converged", config.name, cluster.len());
    } else if config.must_converge {
        error!("Scenario {}: {} of {} peers diverged", config.name, diverging.len(), cluster.len());
    } else {
        warn!("Scenario {}: {} of {} peers diverged", config.name, diverging.len(), cluster.len());
    }

    ScenarioResults {
        scenario: config.name.clone(),
        seed,
        converged,
        must_converge: config.must_converge,
        diverging_peers: diverging,
        duration_ms: start.elapsed().as_millis() as u64,
        metrics,
    }
}

/// Run the full test suite, one blocking task per scenario
pub async fn run_suite(operations: usize, seed: u64) -> Result<SuiteResults, ScenarioError> {
    let scenarios = list_scenarios();
    let mut handles = Vec::with_capacity(scenarios.len());

    for scenario_name in &scenarios {
        info!("Running scenario: {}", scenario_name);
        let config = get_scenario(scenario_name)?;
        handles.push(tokio::task::spawn_blocking(move || run_scenario(&config, operations, seed)));
    }

    let mut results = Vec::new();
    let mut passed = 0;
    let mut failed = 0;

    for handle in handles {
        let result = handle.await?;
        let ok = result.passed();
        if ok {
            passed += 1;
        } else {
            failed += 1;
        }
        results.push((result.scenario.clone(), result, ok));
    }

    Ok(SuiteResults {
        total: scenarios.len(),
        passed,
        failed,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_scenario() {
        let happy = get_scenario("happy").unwrap();
        assert_eq!(happy.name, "happy");
        assert_eq!(happy.faults, FaultConfig::none());
        assert!(happy.must_converge);

        let lossy = get_scenario("lossy").unwrap();
        assert!(!lossy.must_converge);

        let late = get_scenario("late-join").unwrap();
        assert_eq!(late.late_joiners, 2);

        assert!(get_scenario("partition").is_err());
    }

    #[test]
    fn test_list_scenarios() {
        let scenarios = list_scenarios();
        for name in &scenarios {
            assert!(get_scenario(name).is_ok());
        }
        assert!(scenarios.contains(&"duplicates"));
    }

    #[test]
    fn test_custom_rejects_bad_rates() {
        let faults = FaultConfig {
            duplicate_rate: 1.5,
            ..FaultConfig::default()
        };
        assert!(ScenarioConfig::custom(3, 0, 1, faults).is_err());
        assert!(ScenarioConfig::custom(0, 0, 1, FaultConfig::none()).is_err());
        assert!(ScenarioConfig::custom(3, 0, 0, FaultConfig::none()).is_err());
    }

    #[test]
    fn test_run_happy_scenario() {
        let config = get_scenario("happy").unwrap();
        let result = run_scenario(&config, 60, 1);

        assert_eq!(result.scenario, "happy");
        assert!(result.converged, "diverging: {:?}", result.diverging_peers);
        assert_eq!(result.metrics.operations, 60);
        assert!(result.metrics.summary().delivered > 0);
    }

    #[test]
    fn test_duplicates_converge() {
        let config = get_scenario("duplicates").unwrap();
        let result = run_scenario(&config, 120, 7);

        assert!(result.converged, "diverging: {:?}", result.diverging_peers);
        assert!(result.metrics.faults.duplicated > 0);
    }

    #[test]
    fn test_late_joiners_catch_up() {
        let config = get_scenario("late-join").unwrap();
        let result = run_scenario(&config, 90, 3);

        assert!(result.converged, "diverging: {:?}", result.diverging_peers);
        assert_eq!(result.metrics.peers, 5);
    }

    #[test]
    fn test_bursts_converge() {
        let config = get_scenario("bursts").unwrap();
        assert_eq!(config.burst, 4);
        assert!(config.must_converge);

        for seed in [2, 5, 9] {
            let result = run_scenario(&config, 200, seed);
            assert!(result.converged, "seed {} diverging: {:?}", seed, result.diverging_peers);
        }
    }

    #[tokio::test]
    async fn test_suite_passes() {
        let results = run_suite(80, 11).await.unwrap();

        assert_eq!(results.total, 5);
        assert_eq!(results.failed, 0);
        assert!(results.to_junit_xml().contains("tests=\"5\" failures=\"0\""));
    }

    #[test]
    fn test_suite_results_junit() {
        let mut metrics = Metrics::new();
        metrics.record_convergence(4, vec!["peer-3".to_string()]);
        let failing = ScenarioResults {
            scenario: "duplicates".to_string(),
            seed: 1,
            converged: false,
            must_converge: true,
            diverging_peers: vec!["peer-3".to_string()],
            duration_ms: 1500,
            metrics,
        };
        let results = SuiteResults {
            total: 1,
            passed: 0,
            failed: 1,
            results: vec![("duplicates".to_string(), failing, false)],
        };

        let xml = results.to_junit_xml();
        assert!(xml.contains("<testcase name=\"duplicates\" time=\"1.500\">"));
        assert!(xml.contains("1 of 4 peers diverged"));
    }
}
