use std::sync::Arc;

use clap::Parser;
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use unified_resources::{
    ResourceRegistry,
    api::{ApiState, spawn_api_server},
    config::{Config, read_config_file},
};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file; defaults apply when omitted
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("unified_resources", LevelFilter::TRACE),
        ("registry_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };

    let backend = config.storage.open().await?;
    info!("override storage: {}", backend.get_stats().await?);

    let registry = Arc::new(ResourceRegistry::new(
        backend.clone(),
        config.registry.options(),
    ));

    let mut state = ApiState::new(registry);
    if let Some(token) = &config.api.auth_token {
        state = state.with_auth_token(token.clone());
    }
    let addr = spawn_api_server(&config.api, state).await?;
    info!("registry hub ready on {addr}");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    backend.close().await?;

    Ok(())
}
