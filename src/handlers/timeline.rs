//! Timeline handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::{CreateTimelineEventRequest, TimelineEvent};
use crate::services::LoanService;

/// GET /api/loans/:id/timeline - newest first
pub async fn get_timeline(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<Vec<TimelineEvent>>, ApiError> {
    Ok(Json(service.timeline(loan_id).await?))
}

/// POST /api/loans/:id/timeline
pub async fn add_timeline_event(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
    Json(req): Json<CreateTimelineEventRequest>,
) -> Result<(StatusCode, Json<TimelineEvent>), ApiError> {
    req.validate()?;
    let event = service.add_timeline_event(loan_id, req).await?;
    Ok((StatusCode::CREATED, Json(event)))
}
