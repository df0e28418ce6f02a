use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::sse::Event as SseEvent};

use crate::app::services::{self, AppServices};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Live status events for the calling owner.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(owner): Extension<crate::context::OwnerContext>,
) -> axum::response::Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    services::owner_sse_stream(services, owner.owner_id())
}
