//! AI analysis and dashboard routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{ai, dashboard};
use crate::state::AppState;

pub fn ai_routes() -> Router<AppState> {
    Router::new()
        .route("/api/ai/loan-summary", post(ai::loan_summary))
        .route("/api/ai/covenant-explanation", post(ai::covenant_explanation))
        .route("/api/ai/risk-predictions", post(ai::risk_predictions))
        .route("/api/ai/what-changed", post(ai::what_changed))
        .route("/api/ai/extract-loan-dna", post(ai::extract_loan_dna))
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/api/dashboard/stats", get(dashboard::dashboard_stats))
}
