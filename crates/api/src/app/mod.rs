//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/dispatcher/bus selection, background watcher, SSE bridge
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use creatives_infra::OrchestratorConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &OrchestratorConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config).await?);

    // Owner-scoped routes: require the owner header.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn(middleware::owner_middleware));

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new()))
}
