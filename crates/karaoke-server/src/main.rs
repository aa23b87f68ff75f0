use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use karaoke_core::KaraokeConfig;
use karaoke_server::{logging::init_tracing, run_server};

#[derive(Parser)]
#[command(name = "karaoke-server", version, about = "Karaokeify pitch shift and stem separation service")]
struct Cli {
    /// Config file (default: $KARAOKE_CONFIG, then ./karaoke.config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen address, e.g. 0.0.0.0:5000
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = KaraokeConfig::load(cli.config.as_deref()).context("loading config")?;
    if let Some(listen) = cli.listen {
        cfg.listen_addr = listen;
    }

    init_tracing(&cfg.log_filter);
    tracing::info!(
        listen_addr = %cfg.listen_addr,
        work_root = %cfg.work_root.display(),
        separator = %cfg.tools.separator,
        model = %cfg.separation.model,
        "Karaokeify boot"
    );

    run_server(cfg).await.map_err(anyhow::Error::msg)?;
    Ok(())
}
