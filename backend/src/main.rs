use std::{error::Error, sync::Arc};

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracker_routing::{
    config::Config,
    create_router,
    service::{spawn_maintenance, RouteService},
    upstream::OsrmClient,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tracker_routing=debug,tower_http=info,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    let upstream = OsrmClient::new(config.osrm_settings())?;
    tracing::info!(
        "routing through OSRM at {} (profile {})",
        config.osrm_url,
        config.osrm_profile
    );

    let service = Arc::new(RouteService::new(
        Arc::new(upstream),
        config.service_config(),
    ));
    let _maintenance = spawn_maintenance(Arc::clone(&service), config.maintenance_interval());

    let app = create_router(AppState { service });

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    tracing::info!("starting routing proxy on http://{}", config.listen);
    tracing::info!("  POST /api/routing - compute a route (set \"stream\": true for NDJSON)");
    tracing::info!("  GET /api/routing - cache statistics");
    tracing::info!("  DELETE /api/routing - evict expired entries");
    axum::serve(listener, app).await?;
    Ok(())
}
