//! Covenant breach predictions
//!
//! Predictions are produced by a pluggable [`PredictionProvider`]. The
//! deterministic [`StatusBasedPredictor`] derives them from covenant status
//! alone; the AI-backed provider lives in [`crate::ai::AiAdvisor`] and falls
//! back to the status-based one. Predictions never feed into the compliance
//! score.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::models::{Covenant, CovenantStatus, CovenantType, Loan, RiskPrediction, Trend};

/// Probability assigned to each status by the deterministic provider
const PROBABILITY_COMPLIANT: i32 = 15;
const PROBABILITY_AT_RISK: i32 = 70;
const PROBABILITY_BREACHED: i32 = 100;
const PROBABILITY_UPCOMING: i32 = 30;
const PROBABILITY_WAIVED: i32 = 5;

/// Loan score above which compliant covenants are considered improving
const IMPROVING_SCORE_THRESHOLD: i32 = 90;

/// Probability above which a breach is expected within the quarter
pub const HIGH_RISK_PROBABILITY: i32 = 50;

pub const NO_FINANCIAL_COVENANTS: &str = "No financial covenants to analyze";

/// Where a piece of generated content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeSource {
    Ai,
    Fallback,
}

/// Predictions for one loan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionReport {
    pub predictions: Vec<RiskPrediction>,
    pub source: NarrativeSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PredictionReport {
    pub fn empty(source: NarrativeSource) -> Self {
        Self {
            predictions: Vec::new(),
            source,
            message: Some(NO_FINANCIAL_COVENANTS.to_string()),
        }
    }
}

/// Produces breach predictions for a loan's financial covenants
#[async_trait]
pub trait PredictionProvider: Send + Sync {
    async fn predict(&self, loan: &Loan) -> ApiResult<PredictionReport>;
}

/// Covenants considered for prediction
pub fn financial_covenants(loan: &Loan) -> Vec<&Covenant> {
    loan.covenants
        .iter()
        .filter(|c| c.covenant_type == CovenantType::Financial)
        .collect()
}

/// Deterministic predictions derived from covenant status
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusBasedPredictor;

impl StatusBasedPredictor {
    fn base_probability(status: CovenantStatus) -> i32 {
        match status {
            CovenantStatus::Compliant => PROBABILITY_COMPLIANT,
            CovenantStatus::AtRisk => PROBABILITY_AT_RISK,
            CovenantStatus::Breached => PROBABILITY_BREACHED,
            CovenantStatus::Upcoming => PROBABILITY_UPCOMING,
            CovenantStatus::Waived => PROBABILITY_WAIVED,
        }
    }

    fn trend(status: CovenantStatus, loan_score: i32) -> Trend {
        match status {
            CovenantStatus::AtRisk | CovenantStatus::Breached => Trend::Deteriorating,
            CovenantStatus::Compliant if loan_score > IMPROVING_SCORE_THRESHOLD => Trend::Improving,
            _ => Trend::Stable,
        }
    }

    fn breach_date(status: CovenantStatus, probability: i32) -> &'static str {
        if status == CovenantStatus::Breached {
            "Already breached"
        } else if probability > HIGH_RISK_PROBABILITY {
            "Within 3 months"
        } else {
            "N/A"
        }
    }

    fn explanation(covenant: &Covenant, probability: i32) -> String {
        match covenant.status {
            CovenantStatus::Breached => format!(
                "{} is currently breached. Immediate remediation or a waiver is required.",
                covenant.title
            ),
            CovenantStatus::AtRisk => format!(
                "{} is trending towards its threshold. Estimated {}% likelihood of breach.",
                covenant.title, probability
            ),
            CovenantStatus::Waived => format!(
                "{} is under an active waiver. Breach risk is minimal while the waiver holds.",
                covenant.title
            ),
            CovenantStatus::Upcoming => format!(
                "{} has an upcoming test date. Risk will be reassessed once results are reported.",
                covenant.title
            ),
            CovenantStatus::Compliant => format!(
                "{} is within its threshold. Breach risk is low based on current status.",
                covenant.title
            ),
        }
    }

    /// Prediction for a single covenant
    pub fn predict_covenant(&self, covenant: &Covenant, loan_score: i32) -> RiskPrediction {
        let probability = Self::base_probability(covenant.status);
        RiskPrediction {
            covenant_id: covenant.id,
            covenant_title: covenant.title.clone(),
            current_value: covenant.value.clone().unwrap_or_else(|| "Pending".to_string()),
            threshold: covenant.threshold.clone().unwrap_or_else(|| "N/A".to_string()),
            predicted_breach_date: Self::breach_date(covenant.status, probability).to_string(),
            probability,
            trend: Self::trend(covenant.status, loan_score),
            explanation: Self::explanation(covenant, probability),
        }
    }

    /// Predictions for every financial covenant of `loan`
    pub fn predict_loan(&self, loan: &Loan) -> PredictionReport {
        let covenants = financial_covenants(loan);
        if covenants.is_empty() {
            return PredictionReport::empty(NarrativeSource::Fallback);
        }

        PredictionReport {
            predictions: covenants
                .into_iter()
                .map(|c| self.predict_covenant(c, loan.compliance_score))
                .collect(),
            source: NarrativeSource::Fallback,
            message: None,
        }
    }
}

#[async_trait]
impl PredictionProvider for StatusBasedPredictor {
    async fn predict(&self, loan: &Loan) -> ApiResult<PredictionReport> {
        Ok(self.predict_loan(loan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LoanStatus;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn covenant(title: &str, kind: CovenantType, status: CovenantStatus) -> Covenant {
        Covenant {
            id: Uuid::new_v4(),
            title: title.to_string(),
            covenant_type: kind,
            due_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            status,
            value: Some("2.9x".to_string()),
            threshold: Some("3.0x".to_string()),
            description: String::new(),
            frequency: None,
            waiver_reason: None,
            waiver_date: None,
            waiver_approved_by: None,
        }
    }

    fn loan(covenants: Vec<Covenant>, score: i32) -> Loan {
        Loan {
            id: Uuid::new_v4(),
            borrower: "Initech".to_string(),
            amount: Decimal::new(1_000_000, 0),
            currency: "USD".to_string(),
            interest_rate: Decimal::new(6, 0),
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            maturity_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            status: LoanStatus::Active,
            compliance_score: score,
            risk_summary: None,
            covenants,
            timeline_events: Vec::new(),
            loan_dna: None,
            risk_predictions: Vec::new(),
            documents: Vec::new(),
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_probabilities_follow_status() {
        let predictor = StatusBasedPredictor;
        let cases = [
            (CovenantStatus::Compliant, 15, "N/A"),
            (CovenantStatus::AtRisk, 70, "Within 3 months"),
            (CovenantStatus::Breached, 100, "Already breached"),
            (CovenantStatus::Upcoming, 30, "N/A"),
            (CovenantStatus::Waived, 5, "N/A"),
        ];

        for (status, probability, breach_date) in cases {
            let prediction =
                predictor.predict_covenant(&covenant("Leverage", CovenantType::Financial, status), 80);
            assert_eq!(prediction.probability, probability, "{:?}", status);
            assert_eq!(prediction.predicted_breach_date, breach_date, "{:?}", status);
        }
    }

    #[test]
    fn test_trend_depends_on_status_and_score() {
        let compliant = covenant("Leverage", CovenantType::Financial, CovenantStatus::Compliant);
        let predictor = StatusBasedPredictor;

        assert_eq!(predictor.predict_covenant(&compliant, 95).trend, Trend::Improving);
        assert_eq!(predictor.predict_covenant(&compliant, 90).trend, Trend::Stable);

        let breached = covenant("Leverage", CovenantType::Financial, CovenantStatus::Breached);
        assert_eq!(predictor.predict_covenant(&breached, 95).trend, Trend::Deteriorating);
    }

    #[test]
    fn test_only_financial_covenants_are_predicted() {
        let loan = loan(
            vec![
                covenant("Leverage", CovenantType::Financial, CovenantStatus::AtRisk),
                covenant("Audit", CovenantType::Reporting, CovenantStatus::Breached),
            ],
            50,
        );

        let report = StatusBasedPredictor.predict_loan(&loan);
        assert_eq!(report.predictions.len(), 1);
        assert_eq!(report.predictions[0].covenant_title, "Leverage");
        assert_eq!(report.source, NarrativeSource::Fallback);
    }

    #[test]
    fn test_no_financial_covenants_yields_message() {
        let loan = loan(
            vec![covenant("Audit", CovenantType::Reporting, CovenantStatus::Compliant)],
            100,
        );
        let report = StatusBasedPredictor.predict_loan(&loan);
        assert!(report.predictions.is_empty());
        assert_eq!(report.message.as_deref(), Some(NO_FINANCIAL_COVENANTS));
    }

    #[test]
    fn test_predictions_are_deterministic() {
        let loan = loan(
            vec![covenant("Leverage", CovenantType::Financial, CovenantStatus::AtRisk)],
            0,
        );
        let first = StatusBasedPredictor.predict_loan(&loan);
        let second = StatusBasedPredictor.predict_loan(&loan);
        assert_eq!(first.predictions, second.predictions);
    }
}
