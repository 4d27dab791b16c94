use crate::place_logic::config::{self, Config};
use crate::place_logic::state::AppState;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;

pub async fn run(config: Config, app_state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let secs = config
        .monitor_interval_seconds
        .unwrap_or(config::DEFAULT_MONITOR_INTERVAL_SECONDS);
    let mut tick = interval(Duration::from_secs(secs));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Monitor task received shutdown signal.");
                break;
            }
            _ = tick.tick() => {
                let clients = app_state.client_count().await;
                let (placed, store_dropped, malformed) = app_state.stats();
                log::info!(
                    "{} live clients, {} placements confirmed, {} dropped by storage, {} malformed frames ignored",
                    clients,
                    placed,
                    store_dropped,
                    malformed
                );
            }
        }
    }
}
