// Background worker that periodically arms an arena or a boss arena.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::server::{GameServer, Readiness};

/// Spawn the readiness loop. A zero interval disables it.
pub fn spawn_readiness_worker(game_server: Arc<GameServer>, interval: Duration) {
    if interval.is_zero() {
        tracing::info!("Readiness worker disabled");
        return;
    }
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match game_server.readiness_tick().await {
                Readiness::Busy => tracing::debug!("Readiness tick skipped: game in progress"),
                armed => tracing::info!(?armed, "Readiness tick armed"),
            }
        }
    });
}
