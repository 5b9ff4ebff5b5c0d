//! DocuChat BFF - resilient service gateway, answer stream relay, range
//! media serving.

use std::sync::Arc;

use axum::middleware;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docuchat_backend::{api, logging, AppState, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load().map_err(|e| {
        format!(
            "Failed to load configuration: {}. \
             Make sure config.toml exists or set DOCUCHAT__* environment variables.",
            e
        )
    })?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting DocuChat BFF");

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let state = Arc::new(AppState::new(config)?);

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .merge(api::router())
        .layer(middleware::from_fn(logging::request_logger))
        .layer(cors)
        .with_state(state);

    // Start server
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
