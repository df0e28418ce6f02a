use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use creatives_infra::{OrchestratorError, StoreError};

/// Map an orchestration error to a JSON error response.
///
/// Records owned by someone else answer exactly like missing ones.
pub fn orchestrator_error_to_response(err: OrchestratorError) -> axum::response::Response {
    match err {
        OrchestratorError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        OrchestratorError::InvalidState(msg) => json_error(StatusCode::CONFLICT, "invalid_state", msg),
        OrchestratorError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        OrchestratorError::Persistence(StoreError::NotFound(msg)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", msg)
        }
        OrchestratorError::Persistence(StoreError::OwnerIsolation) => {
            json_error(StatusCode::NOT_FOUND, "not_found", "not found")
        }
        OrchestratorError::Persistence(e) => {
            tracing::error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "persistence_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path id, answering 400 on garbage.
pub fn parse_id<T: FromStr>(raw: &str, what: &'static str) -> Result<T, axum::response::Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use creatives_core::RequestId;

    #[test]
    fn isolation_looks_like_not_found() {
        let res = orchestrator_error_to_response(OrchestratorError::Persistence(StoreError::OwnerIsolation));
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = orchestrator_error_to_response(OrchestratorError::invalid_state("busy"));
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = orchestrator_error_to_response(OrchestratorError::Persistence(StoreError::storage("down")));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn bad_path_ids_are_rejected() {
        assert!(parse_id::<RequestId>("nope", "request").is_err());
        let id = RequestId::new();
        assert_eq!(parse_id::<RequestId>(&id.to_string(), "request").ok(), Some(id));
    }
}
