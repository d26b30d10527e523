// Draft room server entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database behind the retrying gateway
// 4. Load leagues and the player pool
// 5. Build the draft engine
// 6. Spawn the timeout sweeper
// 7. Serve WebSocket requests until Ctrl+C
// 8. Cleanup on exit

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};

use draftroom_core::draft::clock::{run_sweeper, SystemClock};
use draftroom_core::gateway::{RetryingGateway, SqliteGateway};
use draftroom_core::services::{StaticLeagueDirectory, StaticPlayerDirectory};
use draftroom_core::DraftEngine;
use draftroom_server::config;
use draftroom_server::ws_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Draft room starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {} leagues, port {}",
        config.leagues.len(),
        config.server.ws_port
    );

    // 3. Open database
    let sqlite = SqliteGateway::open(&config.database.path).context("failed to open database")?;
    info!("Database opened at {}", config.database.path);
    let gateway = Arc::new(RetryingGateway::new(sqlite, config.retry_policy()));

    // 4. Leagues and players
    let leagues = Arc::new(StaticLeagueDirectory::new(config.leagues.clone()));
    info!("Serving leagues: {:?}", leagues.league_ids());
    let players = StaticPlayerDirectory::from_csv(Path::new(&config.data.players))
        .context("failed to load player pool")?;
    if players.is_empty() {
        anyhow::bail!("player pool {} is empty", config.data.players);
    }

    // 5. Engine
    let engine = Arc::new(DraftEngine::new(
        gateway,
        leagues,
        Arc::new(players),
        Arc::new(SystemClock),
        config.engine_settings(),
    ));

    // 6. Timeout sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(run_sweeper(
        Arc::clone(&engine),
        config.sweep_interval(),
        shutdown_rx.clone(),
    ));

    // 7. WebSocket server
    let listener = ws_server::bind(config.server.ws_port)
        .await
        .with_context(|| format!("failed to bind port {}", config.server.ws_port))?;
    let server = tokio::spawn(ws_server::run(listener, engine, shutdown_rx));

    info!(
        "Draft room ready on 127.0.0.1:{}",
        config.server.ws_port
    );
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Shutdown requested");

    // 8. Cleanup
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        if let Ok(Err(e)) = server.await {
            error!("WebSocket server error: {}", e);
        }
        let _ = sweeper.await;
    })
    .await;

    info!("Draft room shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to `logs/draftroom.log`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("draftroom.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("draftroom=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
