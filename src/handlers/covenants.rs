//! Covenant handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::{
    Covenant, CovenantStatusResponse, CovenantWithLoan, CreateCovenantRequest, ListCovenantsQuery,
    UpdateCovenantRequest, UpdateCovenantStatusRequest,
};
use crate::services::LoanService;

/// POST /api/loans/:id/covenants
pub async fn add_covenant(
    State(service): State<Arc<LoanService>>,
    user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
    Json(req): Json<CreateCovenantRequest>,
) -> Result<(StatusCode, Json<Covenant>), ApiError> {
    req.validate()?;
    let covenant = service.add_covenant(loan_id, req, &user.name).await?;
    Ok((StatusCode::CREATED, Json(covenant)))
}

/// GET /api/covenants?loan_id=
pub async fn list_covenants(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListCovenantsQuery>,
) -> Result<Json<Vec<CovenantWithLoan>>, ApiError> {
    Ok(Json(service.list_covenants(query.loan_id).await?))
}

/// GET /api/covenants/:id
pub async fn get_covenant(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CovenantWithLoan>, ApiError> {
    Ok(Json(service.get_covenant(id).await?))
}

/// PUT /api/covenants/:id
pub async fn update_covenant(
    State(service): State<Arc<LoanService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCovenantRequest>,
) -> Result<Json<CovenantWithLoan>, ApiError> {
    req.validate()?;
    Ok(Json(service.update_covenant(id, req, &user.name).await?))
}

/// DELETE /api/covenants/:id
pub async fn delete_covenant(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    service.delete_covenant(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/covenants/:id/status
pub async fn update_covenant_status(
    State(service): State<Arc<LoanService>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCovenantStatusRequest>,
) -> Result<Json<CovenantStatusResponse>, ApiError> {
    req.validate()?;
    Ok(Json(
        service.change_covenant_status(id, req, &user.name).await?,
    ))
}

/// PATCH /api/loans/:id/covenants/:covenant_id/status
pub async fn update_loan_covenant_status(
    State(service): State<Arc<LoanService>>,
    user: AuthenticatedUser,
    Path((loan_id, covenant_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateCovenantStatusRequest>,
) -> Result<Json<CovenantStatusResponse>, ApiError> {
    req.validate()?;
    Ok(Json(
        service
            .change_loan_covenant_status(loan_id, covenant_id, req, &user.name)
            .await?,
    ))
}
