use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::jwt::TokenKeys;
use crate::config::Config;
use crate::db::DbBackend;

pub mod handlers;
pub mod middleware;
pub mod router;

/// Read-only after startup; every request gets it through `State`.
pub struct AppState {
    pub db: DbBackend,
    pub keys: TokenKeys,
    pub bcrypt_cost: u32,
    pub max_pagination_size: Option<u32>,
}

impl AppState {
    pub fn new(cfg: &Config, db: DbBackend) -> Result<Self> {
        Ok(Self {
            db,
            keys: TokenKeys::new(cfg.auth.jwt_secret.clone(), cfg.auth.jwt_algorithm()?),
            bcrypt_cost: cfg.auth.bcrypt_cost,
            max_pagination_size: cfg.database.max_pagination_size,
        })
    }
}

pub async fn serve(cfg: Config, db: DbBackend) -> Result<()> {
    let bind_addr = format!("{}:{}", cfg.server.bind, cfg.server.port);
    let state = Arc::new(AppState::new(&cfg, db)?);
    let cors = build_cors_layer(&cfg.server.cors_allowed_origins);
    let app = build_app(state, cors);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Person registry API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("No valid CORS origins configured; CORS will block all cross-origin requests");
        return CorsLayer::new();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn build_app(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .merge(router::routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
