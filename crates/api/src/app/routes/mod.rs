use axum::{routing::get, Router};

pub mod jobs;
pub mod requests;
pub mod system;

/// Router for all owner-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/stream", get(system::stream))
        .nest("/requests", requests::router())
        .nest("/jobs", jobs::router())
}
