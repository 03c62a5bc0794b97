//! User profile routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::user;
use crate::state::AppState;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/user/profile",
            get(user::get_profile).put(user::update_profile),
        )
        .route("/api/user/change-password", post(user::change_password))
}
