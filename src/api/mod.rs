//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;
mod state;

use axum::http::{header, Method};
use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::create_router;
pub use state::AppState;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Axum layers are applied in reverse order (last added = first executed)
    // Order: logging -> identity -> handler
    let protected_routes = create_router()
        .layer(axum_middleware::from_fn(middleware::identity_middleware))
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(middleware::REQUEST_USER_HEADER),
            header::HeaderName::from_static(middleware::CORRELATION_ID_HEADER),
            header::HeaderName::from_static(routes::IDEMPOTENCY_KEY_HEADER),
        ]);

    Router::new()
        // Health check (no identity)
        .route("/health", get(health_check))
        .nest("/api/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
