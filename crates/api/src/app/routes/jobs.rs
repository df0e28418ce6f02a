use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use creatives_core::{FormatTag, JobId};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_job))
        .route("/stats", get(job_stats))
        .route("/:id", get(get_job))
        .route("/:id/retry", post(retry_job))
        .route("/:id/processing", post(mark_processing))
        .route("/:id/complete", post(complete_job))
        .route("/:id/fail", post(fail_job))
}

fn job_id(raw: &str) -> Result<JobId, axum::response::Response> {
    errors::parse_id(raw, "job")
}

/// Single-format job with no parent request.
pub async fn create_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
    Json(body): Json<dto::CreateJobBody>,
) -> axum::response::Response {
    let format: FormatTag = match body.format.parse() {
        Ok(f) => f,
        Err(e) => return errors::orchestrator_error_to_response(e.into()),
    };

    match services
        .creatives
        .orchestrator
        .create_standalone_job(owner.owner_id(), format, body.payload)
        .await
    {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match job_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.creatives.queries.get_job(owner.owner_id(), job_id).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn job_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
) -> axum::response::Response {
    match services.creatives.queries.job_stats(owner.owner_id()).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn retry_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match job_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.creatives.retry.retry_job(owner.owner_id(), job_id).await {
        Ok(retried) => (StatusCode::OK, Json(retried)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

// -------------------------
// Worker callbacks
// -------------------------

pub async fn mark_processing(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match job_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.creatives.lifecycle.mark_processing(owner.owner_id(), job_id).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn complete_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CompleteJobBody>,
) -> axum::response::Response {
    let job_id = match job_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services
        .creatives
        .lifecycle
        .complete(owner.owner_id(), job_id, body.result_ref)
        .await
    {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn fail_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::FailJobBody>,
) -> axum::response::Response {
    let job_id = match job_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services
        .creatives
        .lifecycle
        .fail(owner.owner_id(), job_id, body.error)
        .await
    {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
