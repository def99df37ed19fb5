use axum::{routing::{get, post}, Router};
use std::sync::Arc;
use super::AppState;
use super::handlers;

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (public)
        .route("/health", get(handlers::health::health_check))
        // Auth (public)
        .route("/api/login", post(handlers::auth::login))
        .route("/api/logout", get(handlers::auth::logout))
        // Current session (protected)
        .route("/api/me", get(handlers::auth::me))
        // Person (public)
        .route("/api/person-info/{cpf}", get(handlers::person::person_info))
        .route("/api/signup", post(handlers::person::signup))
        .with_state(state)
}
