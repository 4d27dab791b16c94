//! # Collaborative Pixel Canvas Server
//!
//! A WebSocket server for a shared pixel grid. Every client that connects
//! receives the current canvas as an `init` snapshot, then a `pixel` frame
//! for each placement any client makes from that point on. Placements are
//! written through to PostgreSQL before they are broadcast, so the table is
//! always the canonical canvas and every client converges to it.
//!
//! Wire protocol (JSON text frames on `/ws`):
//! - inbound:  `{"type":"place","x":3,"y":4,"color":"#fff"}`
//! - outbound: `{"type":"init","pixels":[...]}` once per connection, then
//!   `{"type":"pixel","x":3,"y":4,"color":"#fff"}` per confirmed placement.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::signal;

mod place_logic;
use place_logic::{config, downstream, engine::Engine, logger, monitor, state, store::PixelStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = config::load_config();

    let log_dir = config
        .log_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_LOG_DIR));
    let log_level = config
        .log_level
        .clone()
        .unwrap_or_else(|| config::DEFAULT_LOG_LEVEL.to_string());
    logger::setup_logging(&log_dir, &log_level)?;

    let db_url = config
        .database_url
        .clone()
        .context("database URL is required (set DATABASE_URL or --database-url)")?;
    let pool_size = config.db_pool_size.unwrap_or(config::DEFAULT_DB_POOL_SIZE);

    // The store must be reachable at startup; anything else is fatal.
    let store = PixelStore::connect(&db_url, pool_size)
        .await
        .context("failed to connect to the pixel store")?;
    log::info!("Connected to the pixel store");

    let app_state = state::AppState::new();
    let engine = Engine::new(app_state.clone(), store);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let downstream_handle = tokio::spawn(downstream::run(
        config.clone(),
        engine,
        shutdown_tx.subscribe(),
    ));

    let monitor_handle = tokio::spawn(monitor::run(
        config.clone(),
        app_state,
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate()).unwrap();
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let _ = tokio::try_join!(downstream_handle, monitor_handle);

    log::info!("Shutdown complete.");
    Ok(())
}
