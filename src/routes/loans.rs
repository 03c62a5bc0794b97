//! Loan, covenant, timeline and document routes

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::{covenants, documents, loans, timeline};
use crate::state::AppState;

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans", get(loans::list_loans).post(loans::create_loan))
        .route(
            "/api/loans/:id",
            get(loans::get_loan)
                .put(loans::update_loan)
                .delete(loans::delete_loan),
        )
        .route("/api/loans/:id/stats", get(loans::loan_stats))
        .route(
            "/api/loans/:id/recalculate-score",
            post(loans::recalculate_score),
        )
        .route("/api/loans/:id/export.csv", get(loans::export_csv))
        .route("/api/loans/:id/loan-dna", get(loans::loan_dna))
        .route(
            "/api/loans/:id/apply-extraction",
            post(loans::apply_extraction),
        )
        .route("/api/loans/:id/predictions", get(loans::list_predictions))
        .route(
            "/api/loans/:id/predictions/refresh",
            post(loans::refresh_predictions),
        )
        .route("/api/loans/:id/covenants", post(covenants::add_covenant))
        .route(
            "/api/loans/:id/covenants/:covenant_id/status",
            patch(covenants::update_loan_covenant_status),
        )
        .route(
            "/api/loans/:id/timeline",
            get(timeline::get_timeline).post(timeline::add_timeline_event),
        )
        .route(
            "/api/loans/:id/documents",
            get(documents::list_documents).post(documents::upload_document),
        )
}

pub fn covenant_routes() -> Router<AppState> {
    Router::new()
        .route("/api/covenants", get(covenants::list_covenants))
        .route(
            "/api/covenants/:id",
            get(covenants::get_covenant)
                .put(covenants::update_covenant)
                .delete(covenants::delete_covenant),
        )
        .route(
            "/api/covenants/:id/status",
            patch(covenants::update_covenant_status),
        )
}
