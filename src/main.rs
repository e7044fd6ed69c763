use std::sync::Arc;

use tower_http::cors::CorsLayer;

use dinotame::config::Config;
use dinotame::db::Database;
use dinotame::engine::catalog::SpeciesCatalog;
use dinotame::engine::host::LogHooks;
use dinotame::engine::server::GameServer;
use dinotame::error::{GameError, GameResult};
use dinotame::{api, metrics, scheduler};

/// Load the species catalog, narrowed to the configured habitats.
fn load_catalog(config: &Config) -> GameResult<SpeciesCatalog> {
    let catalog = SpeciesCatalog::load(&config.catalog_path)?;
    let Some(habitats) = config.habitat_filter()? else {
        return Ok(catalog);
    };
    let filtered = catalog.filter_habitats(&habitats);
    if filtered.wild().is_empty() {
        return Err(GameError::Configuration(format!(
            "no species live in {}",
            habitats.join(", ")
        )));
    }
    tracing::info!(
        habitats = %habitats.join(", "),
        wild = filtered.wild().len(),
        "Habitat filter applied"
    );
    Ok(filtered)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    metrics::register_metrics();

    let catalog = match load_catalog(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");

    let game_server = Arc::new(
        GameServer::new(catalog, db, config.server_options())
            .with_export(config.export_dir.clone(), Arc::new(LogHooks)),
    );

    scheduler::spawn_readiness_worker(game_server.clone(), config.readiness_interval);

    let app = api::router(game_server).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("DinoTame listening on port {}", config.port);
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
