use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use rsu_relay::config::HubConfig;
use rsu_relay::relay::RelayHub;

/// Roadside emergency relay: fans driver reports out to responders,
/// hospitals and the dashboard, and correlates responder acknowledgments.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML config file; defaults are used when it does not exist
    #[arg(short, long, default_value = "config/relay.toml")]
    config: PathBuf,

    /// Override the report port (acknowledgments follow at +10)
    #[arg(long)]
    base_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    let mut config = HubConfig::load_or_default(&args.config)?;
    if let Some(port) = args.base_port {
        config.listen.base_port = port;
    }
    config.validate()?;

    let hub = RelayHub::bind(&config).await.with_context(|| {
        format!(
            "Failed to bind {} / {}",
            config.report_addr(),
            config.ack_addr()
        )
    })?;
    info!("Relay {} started", config.relay.hop_id);

    tokio::select! {
        _ = hub.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
