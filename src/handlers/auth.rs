//! Authentication HTTP handlers

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use validator::Validate;

use crate::auth::AuthService;
use crate::error::ApiError;
use crate::models::{AuthTokensResponse, LoginRequest, RefreshTokenRequest, RegisterRequest};

/// POST /api/auth/register - Create an account and issue tokens
pub async fn register(
    State(auth): State<Arc<AuthService>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthTokensResponse>), ApiError> {
    req.validate()?;
    let tokens = auth.register(req).await?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

/// POST /api/auth/login - Verify credentials and issue tokens
pub async fn login(
    State(auth): State<Arc<AuthService>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthTokensResponse>, ApiError> {
    req.validate()?;
    Ok(Json(auth.login(req).await?))
}

/// POST /api/auth/refresh - Exchange a refresh token for a new pair
pub async fn refresh_token(
    State(auth): State<Arc<AuthService>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<AuthTokensResponse>, ApiError> {
    Ok(Json(auth.refresh_tokens(&req.refresh).await?))
}
