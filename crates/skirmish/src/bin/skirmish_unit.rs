//! # Skirmish Unit
//!
//! Runs on a vehicle. Without hardware attached, sensor input comes from a
//! TOML script and effects are logged.
//!
//! ```bash
//! skirmish_unit --unit-id 1 --team red --script red.toml --duration 120
//! ```

use anyhow::{bail, Context};
use clap::Parser;
use skirmish::events::shutdown_on_interrupt;
use skirmish::{logging, LoggingEffects, LoopDriver, ScriptedSensors, SkirmishConfig, UnitProcess};
use skirmish_networking::{UdpLink, UnitClient};
use skirmish_shared::{SystemClock, Team, UnitId, UnitIdentity};
use std::path::PathBuf;
use std::time::Duration;

/// Vehicle-side participant for Skirmish.
#[derive(Parser, Debug)]
#[command(name = "skirmish_unit", version, about)]
struct Args {
    /// This vehicle's id. Must be at least 1.
    #[arg(short, long)]
    unit_id: u32,

    /// `red` or `blue`.
    #[arg(short, long)]
    team: Team,

    /// Config file (defaults apply when omitted).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker address; overrides `[network] broker`.
    #[arg(short, long)]
    broker: Option<String>,

    /// Sensor script, timed from process start.
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Log filter, e.g. `debug`.
    #[arg(long)]
    log_level: Option<String>,

    /// Exit after this many seconds.
    #[arg(long)]
    duration: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.log_level.as_deref());

    let id = UnitId(args.unit_id);
    if id.is_arbiter() {
        bail!("unit id {} is reserved for the arbiter", args.unit_id);
    }
    let identity = UnitIdentity::new(id, args.team);

    let mut config = match &args.config {
        Some(path) => SkirmishConfig::load(path)?,
        None => SkirmishConfig::default(),
    };
    if let Some(broker) = args.broker {
        config.network.broker = broker;
    }

    let sensors = match &args.script {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read script {}", path.display()))?;
            ScriptedSensors::from_toml(&text).with_context(|| format!("invalid script {}", path.display()))?
        }
        None => ScriptedSensors::default(),
    };
    tracing::info!(unit = %identity, steps = sensors.remaining(), "sensor script loaded");

    let link = UdpLink::connect(
        config.network.client_bind_addr()?,
        config.network.broker_addr()?,
        config.network.link_liveness(),
    )
    .with_context(|| format!("cannot reach broker at {}", config.network.broker))?;
    let client = UnitClient::new(
        link,
        identity,
        &config.rules,
        &config.reliability,
        config.session.clone(),
    )?;
    let mut process = UnitProcess::new(
        client,
        sensors,
        LoggingEffects::new(id),
        config.runtime.telemetry_interval(),
    );

    let mut driver = LoopDriver::new(SystemClock::new(), config.runtime.clone());
    shutdown_on_interrupt(driver.sender()).context("cannot install interrupt handler")?;
    driver.run(&mut process, args.duration.map(Duration::from_secs));

    let client = process.client();
    println!(
        "{} session={:?} possession={:?} sent={} retransmits={}",
        identity,
        client.session_state(),
        client.machine().possession(),
        client.stats().sent,
        client.stats().retransmits
    );
    Ok(())
}
