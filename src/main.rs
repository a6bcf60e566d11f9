use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tabrelay::cli::{replay, Cli, Commands};
use tabrelay::BridgeConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabrelay=info,background=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match BridgeConfig::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => BridgeConfig::load(),
    };

    let result = match cli.command {
        Commands::Replay { transcript, bundle } => {
            replay::run_replay(&transcript, config, bundle.as_deref()).await
        }
        Commands::CheckConfig => config
            .validate()
            .map_err(anyhow::Error::from)
            .and_then(|()| Ok(toml::to_string_pretty(&config)?))
            .map(|text| print!("{}", text)),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
