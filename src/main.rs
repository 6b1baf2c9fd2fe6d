//! Entry point for the bot-tournament coordinator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use botarena::broker::AmqpTester;
use botarena::clients::{HttpAuthClient, HttpGamesClient, HttpNotifyClient};
use botarena::config::Config;
use botarena::hub::Hub;
use botarena::server::{run_server, AppState};
use botarena::store::PgStore;

/// Coordinates bot verification, matchmaking and live status fan-out.
#[derive(Parser, Debug)]
#[command(name = "botarena", version)]
struct Cli {
    /// Path to the TOML configuration file; created with defaults when
    /// missing.
    #[arg(long, default_value = "botarena.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let config = Config::load_or_create(&cli.config)
        .with_context(|| format!("loading or creating config '{}'", cli.config.display()))?;
    tracing::info!(config = %cli.config.display(), games = ?config.game_slugs);

    let store = PgStore::connect(&config.database_url).await?;
    let tester = AmqpTester::connect(&config.amqp_url).await?;

    let state = AppState {
        store: Arc::new(store),
        tester: Arc::new(tester),
        auth: Arc::new(HttpAuthClient::new(&config.auth_url)),
        games: Arc::new(HttpGamesClient::new(&config.games_url)),
        notify: Arc::new(HttpNotifyClient::new(&config.notify_url)),
        hub: Hub::spawn(),
        config: Arc::new(config),
    };

    run_server(state).await
}
