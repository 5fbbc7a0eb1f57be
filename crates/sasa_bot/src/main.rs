use clap::Parser;
use sasa_core::BotConfig;
use tracing::info;

mod server;
mod services;

#[derive(Parser, Debug)]
#[command(author, version, about = "鲨鲨 — 有记忆有情绪的 QQ 群聊机器人", long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "sasa.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = BotConfig::load_or_default(&args.config);
    info!("starting with data dir {}", config.memory.data_dir.display());

    let (dispatcher, outbox) = services::build(&config).await?;
    server::run(&config.server.host, config.server.port, dispatcher, outbox).await
}
