//! AI analysis handlers

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::header,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::documents::{read_upload, UploadedFile};
use super::AuthenticatedUser;
use crate::ai::AiError;
use crate::error::ApiError;
use crate::models::ExtractionResult;
use crate::services::{NarrativeSource, PredictionReport};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanAnalysisRequest {
    pub loan_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CovenantAnalysisRequest {
    pub loan_id: Uuid,
    pub covenant_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExtractTextRequest {
    #[validate(length(min = 1))]
    pub text: String,
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub summary: String,
    pub source: NarrativeSource,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationResponse {
    pub explanation: String,
    pub source: NarrativeSource,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatChangedResponse {
    pub summary: String,
    pub source: NarrativeSource,
    pub events_analyzed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResponse {
    pub extraction: ExtractionResult,
    pub source: NarrativeSource,
    pub filename: String,
    pub text_length: usize,
}

/// POST /api/ai/loan-summary
pub async fn loan_summary(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(req): Json<LoanAnalysisRequest>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let loan = state.loan_service.get_loan(req.loan_id).await?;
    let narrative = state.advisor.summarize_loan(&loan).await;

    Ok(Json(SummaryResponse {
        summary: narrative.text,
        source: narrative.source,
    }))
}

/// POST /api/ai/covenant-explanation
pub async fn covenant_explanation(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(req): Json<CovenantAnalysisRequest>,
) -> Result<Json<ExplanationResponse>, ApiError> {
    let loan = state.loan_service.get_loan(req.loan_id).await?;
    let covenant = loan
        .covenant(req.covenant_id)
        .ok_or_else(|| ApiError::covenant_not_found(req.covenant_id))?;
    let narrative = state.advisor.explain_covenant(&loan, covenant).await;

    Ok(Json(ExplanationResponse {
        explanation: narrative.text,
        source: narrative.source,
    }))
}

/// POST /api/ai/risk-predictions - runs the predictor and stores the result
pub async fn risk_predictions(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(req): Json<LoanAnalysisRequest>,
) -> Result<Json<PredictionReport>, ApiError> {
    Ok(Json(
        state.loan_service.refresh_predictions(req.loan_id).await?,
    ))
}

/// POST /api/ai/what-changed
pub async fn what_changed(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(req): Json<LoanAnalysisRequest>,
) -> Result<Json<WhatChangedResponse>, ApiError> {
    let loan = state.loan_service.get_loan(req.loan_id).await?;
    let (narrative, events_analyzed) = state.advisor.what_changed(&loan).await;

    Ok(Json(WhatChangedResponse {
        summary: narrative.text,
        source: narrative.source,
        events_analyzed,
    }))
}

fn is_plain_text(file: &UploadedFile) -> bool {
    let by_type = file
        .content_type
        .as_deref()
        .map_or(false, |t| t.starts_with("text/"));
    by_type || file.filename.to_lowercase().ends_with(".txt")
}

async fn document_text(state: &AppState, file: &UploadedFile) -> Result<String, ApiError> {
    if is_plain_text(file) {
        return String::from_utf8(file.bytes.clone())
            .map_err(|_| ApiError::BadRequest("Text document is not valid UTF-8".to_string()));
    }

    let ocr = state.ocr.as_ref().ok_or(AiError::NotConfigured("OCR"))?;
    Ok(ocr.extract_text(&file.bytes, &file.filename).await?)
}

/// POST /api/ai/extract-loan-dna - JSON `{text, filename}` or a multipart `file`
pub async fn extract_loan_dna(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    request: Request,
) -> Result<Json<ExtractionResponse>, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.starts_with("multipart/form-data"));

    let (text, filename) = if is_multipart {
        let mut multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let (file, _) = read_upload(&mut multipart).await?;
        let file = file.ok_or_else(|| {
            ApiError::BadRequest("Multipart field 'file' is required".to_string())
        })?;
        (document_text(&state, &file).await?, file.filename)
    } else {
        let Json(req) = Json::<ExtractTextRequest>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        req.validate()?;
        let filename = req
            .filename
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| "pasted_text.txt".to_string());
        (req.text, filename)
    };

    if text.trim().is_empty() {
        return Err(ApiError::UnprocessableEntity(
            "Document contains no text".to_string(),
        ));
    }

    let (extraction, source) = state.advisor.extract_loan_dna(&text).await;

    Ok(Json(ExtractionResponse {
        extraction,
        source,
        filename,
        text_length: text.chars().count(),
    }))
}
