use api_router::{api_routes_v1, api_state::ApiState, not_implemented};
use axum::Router;
use common::{
    storage::store::StorageManager,
    utils::config::{get_config, AppConfig},
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let storage = StorageManager::new(&config).await?;
    info!(
        backend = ?storage.backend_kind(),
        documents_root = %config.documents_root,
        "Document storage initialized"
    );

    let api_state = ApiState::new(&config, storage).await?;
    let app = build_app(&config, api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_app(config: &AppConfig, api_state: ApiState) -> Router {
    info!(
        ttl_days = config.extractor_ttl_days,
        max_copy_probes = config.max_copy_probes,
        "Mounting extractor API under /api"
    );

    Router::new()
        .nest("/api", api_routes_v1(&api_state))
        .fallback(not_implemented)
        .with_state(api_state)
}
