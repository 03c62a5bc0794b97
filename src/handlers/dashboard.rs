//! Dashboard handler

use axum::{extract::State, Json};
use std::sync::Arc;

use super::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::DashboardStats;
use crate::services::LoanService;

/// GET /api/dashboard/stats
pub async fn dashboard_stats(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(service.dashboard_stats().await?))
}
