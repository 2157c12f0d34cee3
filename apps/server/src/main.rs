use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use guildwiki_server::config::ServerConfig;
use guildwiki_server::events::{run_listener, spawn_consumer, EventConsumer};
use guildwiki_server::gateway::{ChatGateway, MockChatGateway};
use guildwiki_server::shutdown::shutdown_signal;
use guildwiki_server::state::AppState;
use guildwiki_server::tasks;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = ServerConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    tracing::info!("database ready");

    // The gateway frontend registers itself in its own process; standalone,
    // fan-out goes to a recording mock so the core stays exercisable.
    tracing::warn!("no chat gateway attached, using mock gateway");
    let gateway: Arc<dyn ChatGateway> = Arc::new(MockChatGateway::new());

    let state = AppState::new(pool.clone(), config, gateway)?;

    // Shutdown coordination: listener, consumers and the pruning task all
    // stop when the server does.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let consumers: [Arc<dyn EventConsumer>; 2] =
        [state.watch_lists.clone(), state.bindings.clone()];
    for consumer in consumers {
        spawn_consumer(consumer, state.events.subscribe(), shutdown_rx.clone());
    }

    let listener = tokio::spawn(run_listener(
        pool.clone(),
        state.events.clone(),
        shutdown_rx.clone(),
    ));

    let prune_state = state.clone();
    let mut prune_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(prune_state.config.prune_interval_secs);
        loop {
            match tasks::prune::prune_page_uses(&prune_state).await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!("pruned {count} stale page-use rows");
                    }
                }
                Err(e) => tracing::error!("page-use pruning failed: {e}"),
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = prune_shutdown.changed() => {
                    tracing::info!("pruning task shutting down");
                    break;
                }
            }
        }
    });

    tracing::info!("guildwiki core running");
    shutdown_signal().await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = listener.await? {
        tracing::error!(error = %e, "listener exited with error");
    }

    Ok(())
}
