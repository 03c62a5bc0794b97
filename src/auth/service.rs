//! Authentication service
//!
//! Username/password accounts with JWT access and refresh tokens.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{
    AuthTokensResponse, ChangePasswordRequest, LoginRequest, RegisterRequest,
    UpdateProfileRequest, User, UserResponse,
};
use crate::repository::{RepositoryError, UserRepository};

use super::jwt::{generate_access_token, generate_refresh_token, verify_token, JwtError, TokenType};
use super::password::{hash_password, verify_password};

/// Auth service errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Current password is incorrect")]
    WrongPassword,

    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Token error: {0}")]
    Token(#[from] JwtError),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::InvalidRefreshToken
            | AuthError::RefreshTokenExpired => ApiError::Unauthorized(err.to_string()),
            AuthError::WrongPassword => ApiError::BadRequest(err.to_string()),
            AuthError::UsernameTaken(_) => ApiError::Conflict(err.to_string()),
            AuthError::UserNotFound => ApiError::NotFound(err.to_string()),
            AuthError::Token(JwtError::TokenExpired) => ApiError::TokenExpired,
            AuthError::Token(e) => ApiError::Unauthorized(e.to_string()),
            AuthError::Hashing(msg) => ApiError::InternalError(msg),
            AuthError::Repository(e) => e.into(),
        }
    }
}

/// Token lifetimes and hashing cost
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_days: i64,
    pub bcrypt_cost: u32,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, settings: AuthSettings) -> Self {
        Self { users, settings }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.settings.jwt_secret
    }

    fn issue_tokens(&self, user: &User) -> Result<AuthTokensResponse, AuthError> {
        let access = generate_access_token(
            user,
            &self.settings.jwt_secret,
            self.settings.access_token_ttl_seconds,
        )?;
        let refresh = generate_refresh_token(
            user,
            &self.settings.jwt_secret,
            self.settings.refresh_token_ttl_days,
        )?;

        Ok(AuthTokensResponse {
            access,
            refresh,
            token_type: "Bearer".to_string(),
            expires_in: self.settings.access_token_ttl_seconds,
            user: UserResponse::from(user),
        })
    }

    /// Create an account and sign it in
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthTokensResponse, AuthError> {
        let username = request.username.trim().to_string();
        if self.users.find_by_username(&username).await?.is_some() {
            return Err(AuthError::UsernameTaken(username));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username,
            email: request.email.trim().to_lowercase(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            role: request.role.trim().to_string(),
            department: request.department.trim().to_string(),
            password_hash: hash_password(&request.password, self.settings.bcrypt_cost).await?,
            created_at: now,
            updated_at: now,
        };

        self.users.insert(&user).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => AuthError::UsernameTaken(user.username.clone()),
            other => AuthError::Repository(other),
        })?;

        info!(user_id = %user.id, username = %user.username, "User registered");
        self.issue_tokens(&user)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthTokensResponse, AuthError> {
        let user = self
            .users
            .find_by_username(request.username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&request.password, &user.password_hash).await? {
            warn!(username = %user.username, "Failed login attempt");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %user.id, "User logged in");
        self.issue_tokens(&user)
    }

    /// New token pair from a refresh token
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<AuthTokensResponse, AuthError> {
        let claims = verify_token(refresh_token, &self.settings.jwt_secret).map_err(|e| match e {
            JwtError::TokenExpired => AuthError::RefreshTokenExpired,
            _ => AuthError::InvalidRefreshToken,
        })?;

        if !claims.is(TokenType::Refresh) {
            return Err(AuthError::InvalidRefreshToken);
        }

        let user_id = claims.user_id().map_err(|_| AuthError::InvalidRefreshToken)?;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        self.issue_tokens(&user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<User, AuthError> {
        let mut user = self.get_user(user_id).await?;

        if let Some(email) = request.email {
            user.email = email.trim().to_lowercase();
        }
        if let Some(first_name) = request.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = request.last_name {
            user.last_name = last_name.trim().to_string();
        }
        if let Some(role) = request.role {
            user.role = role.trim().to_string();
        }
        if let Some(department) = request.department {
            user.department = department.trim().to_string();
        }
        user.updated_at = Utc::now();

        self.users.update(&user).await?;
        info!(user_id = %user.id, "Profile updated");
        Ok(user)
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        request: ChangePasswordRequest,
    ) -> Result<(), AuthError> {
        let mut user = self.get_user(user_id).await?;

        if !verify_password(&request.old_password, &user.password_hash).await? {
            return Err(AuthError::WrongPassword);
        }

        user.password_hash = hash_password(&request.new_password, self.settings.bcrypt_cost).await?;
        user.updated_at = Utc::now();
        self.users.update(&user).await?;

        info!(user_id = %user.id, "Password changed");
        Ok(())
    }
}
