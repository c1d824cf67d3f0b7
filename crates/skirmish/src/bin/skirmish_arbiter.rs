//! # Skirmish Arbiter
//!
//! The match server. Every capture, drop, deposit and score is decided
//! here and published to the field.
//!
//! Operator commands are read from stdin, one per line:
//!
//! | Command  | Effect                                      |
//! |----------|---------------------------------------------|
//! | `start`  | start when both teams have a unit           |
//! | `force`  | start regardless of the roster              |
//! | `reset`  | back to the lobby, score cleared            |
//! | `quit`   | publish the final state and exit            |
//!
//! ```bash
//! skirmish_arbiter --broker 192.168.1.200:1883 --no-auto-start
//! ```

use anyhow::Context;
use clap::Parser;
use skirmish::events::shutdown_on_interrupt;
use skirmish::{logging, ArbiterProcess, EventSender, LoopDriver, LoopEvent, SkirmishConfig};
use skirmish_networking::{ArbiterServer, UdpLink};
use skirmish_shared::SystemClock;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

/// Match server for Skirmish.
#[derive(Parser, Debug)]
#[command(name = "skirmish_arbiter", version, about)]
struct Args {
    /// Config file (defaults apply when omitted).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker address; overrides `[network] broker`.
    #[arg(short, long)]
    broker: Option<String>,

    /// Log filter, e.g. `debug` or `skirmish_core=trace`.
    #[arg(long)]
    log_level: Option<String>,

    /// Exit after this many seconds.
    #[arg(long)]
    duration: Option<u64>,

    /// Wait for an operator `start` instead of starting once both teams
    /// have joined.
    #[arg(long)]
    no_auto_start: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.log_level.as_deref());

    let mut config = match &args.config {
        Some(path) => SkirmishConfig::load(path)?,
        None => SkirmishConfig::default(),
    };
    if let Some(broker) = args.broker {
        config.network.broker = broker;
    }

    let link = UdpLink::connect(
        config.network.client_bind_addr()?,
        config.network.broker_addr()?,
        config.network.link_liveness(),
    )
    .with_context(|| format!("cannot reach broker at {}", config.network.broker))?;
    let server = ArbiterServer::new(
        link,
        config.rules.clone(),
        &config.reliability,
        config.session.clone(),
        !args.no_auto_start,
    )?;
    let mut process = ArbiterProcess::new(server);

    let mut driver = LoopDriver::new(SystemClock::new(), config.runtime.clone());
    shutdown_on_interrupt(driver.sender()).context("cannot install interrupt handler")?;
    spawn_operator_console(driver.sender()).context("cannot read operator commands")?;

    driver.run(&mut process, args.duration.map(Duration::from_secs));

    let machine = process.server().machine();
    println!(
        "phase={:?} score={} winner={}",
        machine.phase(),
        machine.score(),
        machine.winner().map_or_else(|| "none".to_string(), |team| team.to_string())
    );
    Ok(())
}

fn spawn_operator_console(sender: EventSender) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("operator".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let event = match line.trim() {
                    "" => continue,
                    "start" => LoopEvent::StartMatch { force: false },
                    "force" => LoopEvent::StartMatch { force: true },
                    "reset" => LoopEvent::ResetMatch,
                    "quit" => LoopEvent::Shutdown,
                    other => {
                        tracing::warn!(command = other, "unknown operator command");
                        continue;
                    }
                };
                let quit = event == LoopEvent::Shutdown;
                if !sender.send_blocking(event) || quit {
                    break;
                }
            }
        })?;
    Ok(())
}
