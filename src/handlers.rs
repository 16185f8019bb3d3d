//! HTTP handlers for the playlist generation API.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{AuthFlowError, AuthService};
use crate::error::{ApiResponse, AppError, ErrorKind};
use crate::middleware::{require_session, RequestSession};
use crate::playlist::{PlaylistError, PlaylistGenerator};
use crate::store::SessionCache;

/// Shared, long-lived services handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub generator: PlaylistGenerator,
    pub cache: Arc<dyn SessionCache>,
    pub cache_timeout: Duration,
}

/// Query parameters of the authorization callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// GET /health - Health check.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /ping
pub async fn ping() -> &'static str {
    "pong"
}

/// GET /api/v1/auth/client_cred - Client Credentials token.
pub async fn client_credentials(
    State(state): State<AppState>,
) -> Result<ApiResponse, AppError> {
    let session = state.auth.client_credentials().await?;
    Ok(ApiResponse::ok(
        "Success",
        json!({
            "access_token": session.access_token,
            "token_type": session.token_type,
            "expires_in": session.expires_in,
        }),
    ))
}

/// GET /api/v1/auth/auth_code - URL to start authorization.
pub async fn authorization_url(State(state): State<AppState>) -> ApiResponse {
    ApiResponse::ok("Success", json!({ "url": state.auth.authorization_url() }))
}

/// GET /api/v1/auth/auth_code_callback - Provider redirect target.
pub async fn authorization_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackQuery>,
) -> Result<ApiResponse, AppError> {
    tracing::info!(state = ?params.state, "authorization callback");

    if let Some(error) = params.error.filter(|e| !e.is_empty()) {
        tracing::warn!(%error, "authorization denied by provider");
        return Err(AppError::BadRequest(error));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("authorization code is required".into()))?;

    let done = state.auth.authenticate(&code).await.map_err(|e| match e {
        AuthFlowError::Profile(err) if err.kind == ErrorKind::Auth => {
            AppError::ReauthorizationRequired {
                url: state.auth.authorization_url(),
            }
        }
        AuthFlowError::Exchange(err) => err.into(),
        _ => AppError::Internal,
    })?;

    Ok(ApiResponse::ok(
        "Success",
        json!({
            "access_token": done.session.access_token,
            "token_type": done.session.token_type,
            "expires_in": done.session.expires_in,
            "userId": done.user.id,
        }),
    ))
}

/// GET /api/v1/user/:userId/create_playlist - Build a playlist from the user's taste.
pub async fn create_playlist(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    cached: Option<Extension<RequestSession>>,
) -> Result<ApiResponse, AppError> {
    let from_request = cached.map(|Extension(RequestSession(session))| session);

    let result = match state
        .generator
        .resolve_session(&user_id, from_request)
        .await
    {
        Ok(session) => state.generator.generate(&user_id, &session).await,
        Err(e) => Err(e),
    };

    let generation = result.map_err(|e| match e {
        PlaylistError::NotFound(id) => AppError::NotFound(format!("No user found with Id {}", id)),
        other => {
            tracing::error!(%user_id, stage = ?other.stage(), error = %other, "playlist generation failed");
            AppError::Internal
        }
    })?;

    let data = serde_json::to_value(&generation).map_err(|e| {
        tracing::error!(error = %e, "could not serialize playlist generation");
        AppError::Internal
    })?;
    Ok(ApiResponse::ok("Success", data))
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/client_cred", get(client_credentials))
        .route("/auth_code", get(authorization_url))
        .route("/auth_code_callback", get(authorization_callback));

    let user_routes = Router::new()
        .route("/:userId/create_playlist", get(create_playlist))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/health", get(health))
        .route("/ping", get(ping))
        .nest("/api/v1/auth", auth_routes)
        .nest("/api/v1/user", user_routes)
        .with_state(state)
}
