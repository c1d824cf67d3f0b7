//! # Skirmish Broker
//!
//! UDP relay implementing the topic bus between match processes. Runs on
//! the field router or any host every vehicle can reach.
//!
//! ```bash
//! skirmish_broker --bind 0.0.0.0:1883
//! ```

use anyhow::Context;
use clap::Parser;
use skirmish::{logging, SkirmishConfig};
use skirmish_networking::UdpBroker;
use tokio::sync::watch;

/// Topic relay for Skirmish participants.
#[derive(Parser, Debug)]
#[command(name = "skirmish_broker", version, about)]
struct Args {
    /// Config file (defaults apply when omitted).
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Listen address; overrides `[network] broker_bind`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Log filter, e.g. `debug` or `skirmish_networking=trace`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.log_level.as_deref());

    let config = match &args.config {
        Some(path) => SkirmishConfig::load(path)?,
        None => SkirmishConfig::default(),
    };
    let bind = args.bind.unwrap_or_else(|| config.network.broker_bind.clone());

    let broker = UdpBroker::bind(&bind, config.network.client_timeout())
        .await
        .with_context(|| format!("cannot open broker socket on {bind}"))?;
    tracing::info!(addr = %broker.local_addr()?, "broker listening");

    let (stop, stopped) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            let _ = stop.send(true);
        }
    });

    let stats = broker.run(stopped).await?;
    tracing::info!(
        frames_in = stats.frames_in,
        frames_out = stats.frames_out,
        bad_frames = stats.bad_frames,
        pruned = stats.pruned,
        "broker stopped"
    );
    Ok(())
}
