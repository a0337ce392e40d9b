//! Ring simulator CLI.
//!
//! Runs a graph file against a schedule file and writes the run log.
//!
//! # Usage
//!
//! ```bash
//! ringnet graph.txt schedule.txt
//! ringnet graph.txt schedule.txt --log out.txt --grace 80 --json
//! RUST_LOG=ringnet=debug ringnet graph.txt schedule.txt
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ringnet::{SimConfig, Simulation};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Ring network simulator: leader election, failure detection, repair.
#[derive(Parser, Debug)]
#[command(name = "ringnet")]
#[command(version, about, long_about = None)]
struct Args {
    /// Adjacency file: one `nodeId neighborId...` line per node.
    graph: PathBuf,

    /// Schedule file: election-only or combined ELECT/FAIL lines.
    schedule: PathBuf,

    /// Where to write the run log.
    #[arg(short, long, default_value = "log.txt")]
    log: PathBuf,

    /// Rounds to keep running after the last scheduled event.
    #[arg(short, long, default_value_t = ringnet::config::DEFAULT_GRACE_ROUNDS)]
    grace: u64,

    /// Idle rounds before a node probes its successor.
    #[arg(long, default_value_t = ringnet::config::DEFAULT_PROBE_INTERVAL)]
    probe_interval: u64,

    /// Expected round-trip bound; probes time out after twice this.
    #[arg(long, default_value_t = ringnet::config::DEFAULT_ROUND_TRIP)]
    round_trip: u64,

    /// Per-step wall-clock budget in milliseconds.
    #[arg(long, default_value = "20")]
    step_budget_ms: u64,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,ringnet=info")),
        )
        .init();

    let args = Args::parse();

    let config = SimConfig::default()
        .with_grace_rounds(args.grace)
        .with_probe_interval(args.probe_interval)
        .with_round_trip(args.round_trip)
        .with_step_budget(Duration::from_millis(args.step_budget_ms));

    let mut sim = Simulation::from_files(&args.graph, &args.schedule, config).with_context(|| {
        format!(
            "loading {} and {}",
            args.graph.display(),
            args.schedule.display()
        )
    })?;
    let report = sim.run();

    report
        .log
        .write_to_file(&args.log)
        .with_context(|| format!("writing log file {}", args.log.display()))?;
    info!(
        path = %args.log.display(),
        rounds = report.stats.rounds_executed,
        leaders = report.leaders().len(),
        disconnected = report.disconnected,
        digest = %format!("{:016x}", report.log.digest()),
        "run log written"
    );

    if args.json {
        print_json(&report);
    }
    Ok(())
}

#[cfg(feature = "serialize")]
fn print_json(report: &ringnet::SimulationReport) {
    println!("{}", report.to_json());
}

#[cfg(not(feature = "serialize"))]
fn print_json(_report: &ringnet::SimulationReport) {
    tracing::warn!("--json needs the `serialize` feature");
}
