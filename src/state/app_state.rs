//! Application state shared across handlers

use std::sync::Arc;

use crate::ai::{AiAdvisor, OcrSpaceClient};
use crate::auth::AuthService;
use crate::db::Database;
use crate::services::LoanService;

use axum::extract::FromRef;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub loan_service: Arc<LoanService>,
    pub auth_service: Arc<AuthService>,
    pub advisor: Arc<AiAdvisor>,
    pub ocr: Option<Arc<OcrSpaceClient>>,
    /// `None` when running on the in-memory store
    pub database: Option<Database>,
}

impl AppState {
    pub fn new(
        loan_service: Arc<LoanService>,
        auth_service: Arc<AuthService>,
        advisor: Arc<AiAdvisor>,
        ocr: Option<Arc<OcrSpaceClient>>,
        database: Option<Database>,
    ) -> Self {
        Self {
            loan_service,
            auth_service,
            advisor,
            ocr,
            database,
        }
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}

impl FromRef<AppState> for Arc<AiAdvisor> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.advisor.clone()
    }
}
