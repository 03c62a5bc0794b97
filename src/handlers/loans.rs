//! Loan handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::AuthenticatedUser;
use crate::error::ApiError;
use crate::models::{
    ApplyExtractionRequest, CreateLoanRequest, ExtractionApplied, ListLoansQuery, Loan, LoanDna,
    LoanStats, LoanSummary, RiskPrediction, ScoreRecalculation, UpdateLoanRequest,
};
use crate::services::{LoanService, PredictionReport};

/// GET /api/loans
pub async fn list_loans(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListLoansQuery>,
) -> Result<Json<Vec<LoanSummary>>, ApiError> {
    Ok(Json(service.list_loans(query.status).await?))
}

/// POST /api/loans
pub async fn create_loan(
    State(service): State<Arc<LoanService>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateLoanRequest>,
) -> Result<(StatusCode, Json<Loan>), ApiError> {
    req.validate()?;
    let loan = service.create_loan(req, Some(user.user_id)).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// GET /api/loans/:id
pub async fn get_loan(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Loan>, ApiError> {
    Ok(Json(service.get_loan(id).await?))
}

/// PUT /api/loans/:id
pub async fn update_loan(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLoanRequest>,
) -> Result<Json<Loan>, ApiError> {
    req.validate()?;
    Ok(Json(service.update_loan(id, req).await?))
}

/// DELETE /api/loans/:id
pub async fn delete_loan(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    service.delete_loan(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/loans/:id/stats
pub async fn loan_stats(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LoanStats>, ApiError> {
    Ok(Json(service.loan_stats(id).await?))
}

/// POST /api/loans/:id/recalculate-score
pub async fn recalculate_score(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ScoreRecalculation>, ApiError> {
    Ok(Json(service.recalculate_score(id).await?))
}

/// GET /api/loans/:id/loan-dna
pub async fn loan_dna(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LoanDna>, ApiError> {
    service
        .loan_dna(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Loan {} has no extracted loan DNA", id)))
}

/// POST /api/loans/:id/apply-extraction
pub async fn apply_extraction(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ApplyExtractionRequest>,
) -> Result<Json<ExtractionApplied>, ApiError> {
    req.validate()?;
    Ok(Json(service.apply_extraction(id, req).await?))
}

/// GET /api/loans/:id/predictions
pub async fn list_predictions(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RiskPrediction>>, ApiError> {
    Ok(Json(service.predictions(id).await?))
}

/// POST /api/loans/:id/predictions/refresh
pub async fn refresh_predictions(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PredictionReport>, ApiError> {
    Ok(Json(service.refresh_predictions(id).await?))
}

/// GET /api/loans/:id/export.csv
pub async fn export_csv(
    State(service): State<Arc<LoanService>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let report = service.export_csv(id).await?;
    let disposition = format!("attachment; filename=\"{}\"", report.filename);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        report.body,
    )
        .into_response())
}
