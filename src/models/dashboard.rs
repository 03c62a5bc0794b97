//! Portfolio dashboard projections

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{RiskPrediction, TimelineEvent};

/// Number of high-risk predictions shown on the dashboard
pub const DASHBOARD_TOP_RISKS: usize = 3;

/// Number of recent timeline events shown on the dashboard
pub const DASHBOARD_RECENT_EVENTS: usize = 5;

/// Prediction annotated with its loan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRisk {
    pub loan_id: Uuid,
    pub borrower: String,
    #[serde(flatten)]
    pub prediction: RiskPrediction,
}

/// Timeline event annotated with its loan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanActivity {
    pub loan_id: Uuid,
    pub borrower: String,
    #[serde(flatten)]
    pub event: TimelineEvent,
}

/// Portfolio-wide statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_loans: usize,
    pub total_covenants: usize,
    pub at_risk_covenants: usize,
    pub breached_covenants: usize,
    pub avg_score: i32,
    pub top_risks: Vec<LoanRisk>,
    pub recent_events: Vec<LoanActivity>,
}
