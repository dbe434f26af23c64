use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /api/v1/login
        // Exchanges username and password for a session token (tiers 1 and 2 only).
        .route("/api/v1/login", post(handlers::login))
}
