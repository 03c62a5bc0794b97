//! User profile handlers

use axum::{extract::State, Json};
use std::sync::Arc;
use validator::Validate;

use super::AuthenticatedUser;
use crate::auth::AuthService;
use crate::error::ApiError;
use crate::models::{ChangePasswordRequest, MessageResponse, UpdateProfileRequest, UserResponse};

/// GET /api/user/profile
pub async fn get_profile(
    State(auth): State<Arc<AuthService>>,
    user: AuthenticatedUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = auth.get_user(user.user_id).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// PUT /api/user/profile
pub async fn update_profile(
    State(auth): State<Arc<AuthService>>,
    user: AuthenticatedUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    req.validate()?;
    let user = auth.update_profile(user.user_id, req).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// POST /api/user/change-password
pub async fn change_password(
    State(auth): State<Arc<AuthService>>,
    user: AuthenticatedUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    req.validate()?;
    auth.change_password(user.user_id, req).await?;
    Ok(Json(MessageResponse::new("Password updated successfully")))
}
