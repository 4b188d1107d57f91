//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: event store, bus, dispatcher, read models and the projection worker
//! - `routes/`: handlers, one file per resource
//! - `dto.rs`: request/response bodies and id parsing
//! - `errors.rs`: the JSON envelope and error-to-status mapping

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use ironbooks_auth::Hs256JwtValidator;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod extract;
pub mod routes;
pub mod services;

use services::AppServices;

/// Router over already-built services.
pub fn build_router(services: Arc<AppServices>, jwt_secret: &str) -> Router {
    let jwt = Arc::new(Hs256JwtValidator::new(jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Auth wraps everything under /api, so it runs before the org middleware.
    let protected = routes::router(services.clone())
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", protected)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Build services (store, replay, projection worker) and the router on top.
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<(Router, Arc<AppServices>)> {
    let services = Arc::new(AppServices::build(config).await?);
    let router = build_router(services.clone(), &config.jwt_secret);
    Ok((router, services))
}
