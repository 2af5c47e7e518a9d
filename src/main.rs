mod analyzer;
mod chunker;
mod codec;
mod config;
mod health;
mod llm;
mod platform;
mod router;
mod scanner;
mod scratch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use teloxide::Bot;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::router::Router;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,b64bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            return Err(e);
        }
    };

    let enabled: Vec<&str> = config.commands.enabled.iter().map(|k| k.name()).collect();
    info!("Configuration loaded successfully");
    info!("  Provider: {} ({})", config.llm.provider, config.llm.model);
    info!("  AI analysis: {}", config.analysis_available());
    info!("  Commands: {:?}", enabled);
    info!("  Health port: {}", config.health.port);

    let router = Arc::new(Router::from_config(&config)?);

    // The liveness endpoint runs independently of the dispatcher
    let port = config.health.port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(port).await {
            error!("Health endpoint stopped: {:#}", e);
        }
    });

    let bot = Bot::new(&config.telegram.bot_token);

    info!("Bot is starting...");
    platform::telegram::run(router, bot).await?;

    Ok(())
}
