use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use creatives_core::OwnerId;

use crate::context::OwnerContext;

/// Header carrying the caller's owner id. Authentication happens upstream.
pub const OWNER_HEADER: &str = "x-owner-id";

pub async fn owner_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let owner_id = extract_owner(req.headers())?;
    req.extensions_mut().insert(OwnerContext::new(owner_id));
    Ok(next.run(req).await)
}

fn extract_owner(headers: &HeaderMap) -> Result<OwnerId, StatusCode> {
    let header = headers.get(OWNER_HEADER).ok_or(StatusCode::UNAUTHORIZED)?;
    let header = header.to_str().map_err(|_| StatusCode::BAD_REQUEST)?;

    let raw = header.trim();
    if raw.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    raw.parse().map_err(|_| StatusCode::BAD_REQUEST)
}
