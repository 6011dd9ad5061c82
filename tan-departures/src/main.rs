use std::process::ExitCode;
use std::sync::Arc;

use tan_departures::config::Config;
use tan_departures::coordinator::{DepartureCoordinator, TransitFeed};
use tan_departures::registry::CoordinatorRegistry;
use tan_departures::tan::{MockTanClient, TanClient};
use tan_departures::web::{AppState, create_router};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    let config_path =
        std::env::var("TAN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %config_path, "{e}");
            return ExitCode::FAILURE;
        }
    };
    info!(path = %config_path, stops = config.stops.len(), "Loaded configuration");

    // Serve canned responses instead of calling the live API
    let result = match std::env::var("TAN_MOCK_DIR") {
        Ok(dir) => match MockTanClient::from_dir(&dir) {
            Ok(client) => {
                info!(%dir, stops = ?client.available_stops(), "Using mock TAN client");
                serve(config, client).await
            }
            Err(e) => Err(format!("failed to load mock data from {dir}: {e}")),
        },
        Err(_) => match TanClient::new(config.api.clone()) {
            Ok(client) => serve(config, client).await,
            Err(e) => Err(format!("failed to create TAN client: {e}")),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn serve<C>(config: Config, client: C) -> Result<(), String>
where
    C: TransitFeed + Clone + 'static,
{
    let mut registry = CoordinatorRegistry::new();
    for stop in &config.stops {
        let coordinator = DepartureCoordinator::new(
            stop.code.clone(),
            stop.label.clone(),
            client.clone(),
            &config.schedule_cache,
        );
        registry.register(coordinator).map_err(|e| e.to_string())?;
    }
    let registry = Arc::new(registry);

    let _pollers = registry.spawn_pollers(config.poll_interval());
    info!(
        stops = registry.len(),
        period_secs = config.poll_interval_secs,
        "Started departure pollers"
    );

    let app = create_router(AppState::new(Arc::clone(&registry)));

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .map_err(|e| format!("failed to bind {}: {e}", config.listen))?;
    info!(addr = %config.listen, "Listening");
    info!("  GET  /health");
    info!("  GET  /api/stops");
    info!("  GET  /api/stops/:stop_id");
    info!("  GET  /api/stops/:stop_id/next");
    info!("  POST /api/stops/:stop_id/refresh");

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("server error: {e}"))
}
