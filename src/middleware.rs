//! Session-presence guard for the per-user routes.

use std::collections::HashMap;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::handlers::AppState;
use crate::models::Session;

/// Session found in the cache for the request's user.
#[derive(Clone, Debug)]
pub struct RequestSession(pub Session);

/// Requires an `Authorization` header and a `userId` path segment, then
/// attaches the cached session when there is one. A cache failure or a slow
/// cache is not fatal here; the handler falls back to the user store.
pub async fn require_session(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let has_auth = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|h| !h.trim().is_empty());
    if !has_auth {
        return Err(AppError::Unauthorized(
            "Authorization header missing".into(),
        ));
    }

    let user_id = match params.get("userId") {
        Some(id) if !id.is_empty() => id.clone(),
        _ => {
            return Err(AppError::Unauthorized(
                "User Id path variable required".into(),
            ))
        }
    };

    match tokio::time::timeout(state.cache_timeout, state.cache.get(&user_id)).await {
        Ok(Ok(Some(session))) => {
            request.extensions_mut().insert(RequestSession(session));
        }
        Ok(Ok(None)) => tracing::debug!(%user_id, "no cached session"),
        Ok(Err(e)) => tracing::warn!(%user_id, error = %e, "session cache lookup failed"),
        Err(_) => tracing::warn!(%user_id, timeout = ?state.cache_timeout, "session cache lookup timed out"),
    }

    Ok(next.run(request).await)
}
