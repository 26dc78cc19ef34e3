use dotenvy::dotenv;
use frontdesk::AppState;
use frontdesk::config::get_configuration;
use frontdesk::startup::{RouterOptions, build_factory, build_router};
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    // Initialize tracing using shared logic
    init_tracing(
        "frontdesk",
        &configuration.telemetry.log_level,
        configuration.telemetry.otlp_endpoint.as_deref(),
    );

    frontdesk::services::metrics::init_metrics()?;

    let factory = build_factory(&configuration)?;
    info!(provider = ?configuration.backend.provider, "Backend configured");
    let state = AppState::new(
        factory,
        &configuration.session,
        &configuration.login_rate_limit,
    );
    state.registry.spawn_sweeper(
        configuration.session.idle_timeout(),
        configuration.session.sweep_interval(),
    );
    let app = build_router(state, &RouterOptions::from(&configuration));

    let address = format!(
        "{}:{}",
        configuration.server.host, configuration.server.port
    );
    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
        anyhow::anyhow!("Failed to bind to address {}: {}", address, e)
    })?;

    info!("Starting frontdesk on {}", address);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| {
        tracing::error!("Server error: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;

    Ok(())
}
