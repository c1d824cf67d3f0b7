//! # Skirmish Match Simulation
//!
//! Plays the standard scenario in one process over a simulated radio and
//! prints the outcome. Useful for checking that a set of rules and
//! reliability settings still converges under a given loss rate.
//!
//! ```bash
//! skirmish_match_sim --loss 20 --duplicate 5 --seed 42
//! ```

use anyhow::{ensure, Context};
use clap::Parser;
use skirmish::{logging, MatchScenario, MatchSim, SkirmishConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Deterministic whole-match simulation.
#[derive(Parser, Debug)]
#[command(name = "skirmish_match_sim", version, about)]
struct Args {
    /// Config file (defaults apply when omitted).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for the simulated radio.
    #[arg(short, long, default_value_t = 1)]
    seed: u64,

    /// Packet loss percentage; overrides `[simulation] loss_percent`.
    #[arg(long)]
    loss: Option<u8>,

    /// Duplicate percentage; overrides `[simulation] duplicate_percent`.
    #[arg(long)]
    duplicate: Option<u8>,

    /// Simulated seconds; defaults to the scenario length.
    #[arg(long)]
    duration: Option<u64>,

    /// Log filter, e.g. `debug`.
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.log_level.as_deref());

    let mut config = match &args.config {
        Some(path) => SkirmishConfig::load(path)?,
        None => SkirmishConfig::default(),
    };
    if let Some(loss) = args.loss {
        config.simulation.loss_percent = loss;
    }
    if let Some(duplicate) = args.duplicate {
        config.simulation.duplicate_percent = duplicate;
    }
    config.validate().context("invalid simulation settings")?;

    let mut scenario = MatchScenario::standard(&config.rules);
    if let Some(seconds) = args.duration {
        ensure!(seconds > 0, "duration must be positive");
        scenario.duration = Duration::from_secs(seconds);
    }

    let mut sim = MatchSim::new(&config, scenario, args.seed)?;
    let report = sim.run();

    println!("elapsed      {}", report.elapsed);
    println!("phase        {:?}", report.phase);
    println!("score        {}", report.score);
    println!(
        "winner       {}",
        report.winner.map_or_else(|| "none".to_string(), |team| team.to_string())
    );
    println!("flag         {}", report.flag);
    println!("consistent   {}", report.consistent);
    println!(
        "arbiter      received={} duplicates={} sent={} retransmits={} resyncs={}",
        report.arbiter.received,
        report.arbiter.duplicates,
        report.arbiter.sent,
        report.arbiter.retransmits,
        report.arbiter.resyncs
    );
    for (id, stats) in &report.units {
        println!(
            "unit {id}       received={} duplicates={} sent={} retransmits={} resyncs={}",
            stats.received, stats.duplicates, stats.sent, stats.retransmits, stats.resyncs
        );
    }
    Ok(())
}
