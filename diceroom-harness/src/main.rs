//! Dice Room Harness - Convergence testing for pool replication
//!
//! Runs many in-process room sessions over a shared hub:
//! - `run` - Run one simulation with explicit fault parameters
//! - `scenario` - Run a named scenario
//! - `suite` - Run every named scenario

mod cluster;
mod fault_injection;
mod metrics;
mod scenarios;
mod workload;

use clap::{Parser, Subcommand};
use fault_injection::FaultConfig;
use scenarios::{ScenarioConfig, ScenarioResults};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "diceroom-harness")]
#[command(about = "Convergence testing harness for dice room pool replication")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one simulation with explicit fault parameters
    Run {
        /// Number of peers in the room
        #[arg(short, long, default_value = "4")]
        peers: usize,

        /// Number of operations to execute
        #[arg(short, long, default_value = "200")]
        operations: usize,

        /// Probability that a copy is lost
        #[arg(long, default_value = "0.0")]
        loss: f64,

        /// Probability that a copy is delivered twice
        #[arg(long, default_value = "0.0")]
        duplicate: f64,

        /// Loop broadcasts back to their sender
        #[arg(long)]
        echo: bool,

        /// Keep send order instead of interleaving links
        #[arg(long)]
        no_reorder: bool,

        /// Seed for workload, faults and dice
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Peers that join halfway through
        #[arg(long, default_value = "0")]
        late_joiners: usize,

        /// Operations each peer performs between deliveries
        #[arg(long, default_value = "1")]
        burst: usize,

        /// Path to write the metrics report JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Run a named scenario
    Scenario {
        /// Scenario to run (happy, lossy, duplicates, late-join, bursts)
        #[arg(short, long, default_value = "happy")]
        name: String,

        /// Number of operations to execute
        #[arg(short, long, default_value = "200")]
        operations: usize,

        #[arg(long, default_value = "1")]
        seed: u64,

        /// Path to write the metrics report JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Run the full scenario suite
    Suite {
        /// Number of operations per scenario
        #[arg(short, long, default_value = "200")]
        operations: usize,

        #[arg(long, default_value = "1")]
        seed: u64,

        /// Directory for per-scenario reports
        #[arg(short = 'd', long)]
        output_dir: Option<PathBuf>,

        /// Output JUnit XML file
        #[arg(long)]
        junit_xml: Option<PathBuf>,
    },
}

fn print_results(results: &ScenarioResults) {
    let summary = results.metrics.summary();

    println!("\nScenario: {} (seed {})", results.scenario, results.seed);
    println!("  Peers: {}", summary.peers);
    println!("  Operations: {}", summary.operations);
    println!("  Rolls: {}", summary.rolls);
    println!(
        "  Delivered: {} ({} dropped, {} duplicated, {} garbage)",
        summary.delivered, summary.dropped, summary.duplicated, summary.garbage
    );
    println!("  Messages by channel:");
    for (channel, count) in &results.metrics.message_counts {
        println!("    {:<18} {}", channel, count);
    }
    if results.converged {
        println!("  Converged: yes");
    } else {
        println!(
            "  Converged: no ({} diverging: {})",
            results.diverging_peers.len(),
            results.diverging_peers.join(", ")
        );
    }
}

fn write_report(path: &Path, results: &ScenarioResults) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, results.metrics.export_json(&results.scenario))?;
    info!("Report written to: {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Run {
            peers,
            operations,
            loss,
            duplicate,
            echo,
            no_reorder,
            seed,
            late_joiners,
            burst,
            report,
        } => {
            info!("Running {} peers, {} operations, seed {}", peers, operations, seed);

            let faults = FaultConfig {
                message_loss_rate: loss,
                duplicate_rate: duplicate,
                echo,
                reorder: !no_reorder,
                ..FaultConfig::default()
            };
            let config = ScenarioConfig::custom(peers, late_joiners, burst, faults)?;
            let results = tokio::task::spawn_blocking(move || {
                scenarios::run_scenario(&config, operations, seed)
            })
            .await?;

            print_results(&results);
            if let Some(path) = report {
                write_report(&path, &results)?;
            }
            if !results.passed() {
                std::process::exit(1);
            }
        }

        Commands::Scenario {
            name,
            operations,
            seed,
            report,
        } => {
            let config = scenarios::get_scenario(&name)?;
            info!("Running scenario: {} - {}", config.name, config.description);

            let results = tokio::task::spawn_blocking(move || {
                scenarios::run_scenario(&config, operations, seed)
            })
            .await?;

            print_results(&results);
            if let Some(path) = report {
                write_report(&path, &results)?;
            }
            if !results.passed() {
                std::process::exit(1);
            }
        }

        Commands::Suite {
            operations,
            seed,
            output_dir,
            junit_xml,
        } => {
            info!("Running full scenario suite");

            let results = scenarios::run_suite(operations, seed).await?;

            for (_, result, _) in &results.results {
                print_results(result);
                if let Some(dir) = &output_dir {
                    write_report(&dir.join(format!("{}-report.json", result.scenario)), result)?;
                }
            }

            println!("\nSuite Results:");
            println!("  Total: {}", results.total);
            println!("  Passed: {}", results.passed);
            println!("  Failed: {}", results.failed);

            if let Some(xml_path) = junit_xml {
                std::fs::write(&xml_path, results.to_junit_xml())?;
                info!("JUnit XML written to: {}", xml_path.display());
            }

            if results.failed > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
