use crate::{
    auth::{bearer_token, AuthError, AuthRouterExt, LoginRequest, LoginResponse, RefreshTokenRequest, TokenPair},
    handlers::common::success_response,
    AppState,
};
use axum::{
    extract::{Json, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LogoutRequest {
    /// Also revoke this refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// `/auth` routes. Login and refresh are public; logout needs a bearer token.
pub fn auth_router() -> Router<AppState> {
    let public = Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh_token));
    let authenticated = Router::new().route("/logout", post(logout)).with_auth();
    public.merge(authenticated)
}

/// Log in through the external auth proxy
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "User is inactive"),
        (status = 404, description = "No local user for this login"),
        (status = 502, description = "Auth proxy unreachable"),
        (status = 503, description = "Login not configured")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    payload
        .validate()
        .map_err(|_| AuthError::InvalidCredentials)?;
    let response = state
        .auth
        .login(payload.username.trim(), &payload.password)
        .await?;
    Ok(success_response(response))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 401, description = "Invalid, expired or reused refresh token")
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let tokens = state.auth.refresh_token(&payload.refresh_token).await?;
    Ok(success_response(tokens))
}

/// Revoke the current access token
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body(content = LogoutRequest, description = "Optional refresh token to revoke"),
    responses(
        (status = 200, description = "Logged out"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let token = bearer_token(&headers).ok_or(AuthError::MissingToken)?;
    state.auth.revoke_token(token).await?;

    if let Some(refresh) = payload.and_then(|Json(p)| p.refresh_token) {
        // An already expired refresh token needs no revoking
        match state.auth.revoke_token(&refresh).await {
            Ok(()) | Err(AuthError::TokenExpired) | Err(AuthError::RevokedToken) => {}
            Err(e) => return Err(e),
        }
    }

    info!("User logged out");
    Ok(success_response(serde_json::json!({ "message": "Successfully logged out" })))
}
