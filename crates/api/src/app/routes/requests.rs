use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use creatives_core::{RequestId, RequestedFormats};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_request).get(list_requests))
        .route("/scan", post(scan_requests))
        .route("/:id", get(get_request).delete(delete_request))
        .route("/:id/retry", post(retry_request))
}

pub async fn create_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
    Json(body): Json<dto::CreateRequestBody>,
) -> axum::response::Response {
    let formats = match RequestedFormats::parse(body.formats) {
        Ok(f) => f,
        Err(e) => return errors::orchestrator_error_to_response(e.into()),
    };

    match services
        .creatives
        .orchestrator
        .create_request(owner.owner_id(), formats, body.payload)
        .await
    {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
) -> axum::response::Response {
    match services.creatives.queries.list_requests(owner.owner_id()).await {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request_id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services.creatives.queries.get_request(owner.owner_id(), request_id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn delete_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request_id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services
        .creatives
        .orchestrator
        .delete_request(owner.owner_id(), request_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn retry_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request_id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(res) => return res,
    };

    match services
        .creatives
        .retry
        .retry_request(owner.owner_id(), request_id)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

/// Manual consistency sweep over the caller's requests.
pub async fn scan_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
) -> axum::response::Response {
    match services.creatives.scanner.scan_and_fix(owner.owner_id()).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
