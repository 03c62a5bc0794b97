//! AI advisor: prompts, response parsing and labelled fallbacks

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{prompts, TextGenerator};
use crate::error::ApiResult;
use crate::models::{Covenant, ExtractionResult, KeyTerms, Loan, ProposedCovenant, RiskPrediction, Trend};
use crate::services::prediction::{
    financial_covenants, NarrativeSource, PredictionProvider, PredictionReport, StatusBasedPredictor,
};

/// Prefix on every piece of text that did not come from the AI service
pub const FALLBACK_LABEL: &str = "[Automated fallback]";

/// Characters of document text sent for extraction
pub const DOCUMENT_TEXT_LIMIT: usize = 12_000;

pub const EXTRACTION_CONFIDENCE: i32 = 88;
pub const FALLBACK_EXTRACTION_CONFIDENCE: i32 = 75;

/// Recent events considered by the "what changed" summary
const RECENT_EVENT_LIMIT: usize = 10;

/// Characters of an unparseable AI reply kept as fallback summary
const FALLBACK_SUMMARY_LIMIT: usize = 500;

pub const NO_RECENT_CHANGES: &str = "No significant changes detected. The loan continues to perform as expected with all monitoring activities on schedule.";

/// Generated text with its provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Narrative {
    pub text: String,
    pub source: NarrativeSource,
}

impl Narrative {
    fn ai(text: String) -> Self {
        Self {
            text,
            source: NarrativeSource::Ai,
        }
    }

    fn fallback(text: impl AsRef<str>) -> Self {
        Self {
            text: format!("{} {}", FALLBACK_LABEL, text.as_ref()),
            source: NarrativeSource::Fallback,
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Slice between the first `open` and the last `close` delimiter
fn delimited(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtraction {
    key_terms: Option<KeyTerms>,
    #[serde(default)]
    extracted_covenants: Vec<ProposedCovenant>,
    #[serde(default)]
    risk_factors: Vec<String>,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPrediction {
    probability: Option<Value>,
    trend: Option<String>,
    predicted_breach_date: Option<String>,
    explanation: Option<String>,
}

fn probability_of(value: Option<&Value>) -> i32 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    parsed.map(|p| p.round().clamp(0.0, 100.0) as i32).unwrap_or(50)
}

/// Parse an extraction reply; `None` when it holds no JSON object
pub fn parse_extraction(reply: &str) -> Option<ExtractionResult> {
    let raw: RawExtraction = serde_json::from_str(delimited(reply, '{', '}')?).ok()?;
    Some(ExtractionResult {
        confidence: EXTRACTION_CONFIDENCE,
        key_terms: raw.key_terms.unwrap_or_default(),
        extracted_covenants: raw.extracted_covenants,
        risk_factors: raw.risk_factors,
        summary: raw
            .summary
            .unwrap_or_else(|| "Document analyzed successfully.".to_string()),
    })
}

/// Labelled extraction used when the AI reply cannot be used
pub fn fallback_extraction(reply: Option<&str>) -> ExtractionResult {
    let summary = match reply.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reply) => truncate_chars(reply, FALLBACK_SUMMARY_LIMIT),
        None => "Document analyzed.".to_string(),
    };

    ExtractionResult {
        confidence: FALLBACK_EXTRACTION_CONFIDENCE,
        key_terms: KeyTerms::default(),
        extracted_covenants: vec![ProposedCovenant {
            title: "Maximum Leverage Ratio".to_string(),
            covenant_type: "Financial".to_string(),
            threshold: Some("< 4.0x".to_string()),
            frequency: Some("Quarterly".to_string()),
            description: "Total Net Debt to EBITDA shall not exceed 4.0x".to_string(),
        }],
        risk_factors: vec!["Document parsing requires manual review".to_string()],
        summary: format!("{} {}", FALLBACK_LABEL, summary),
    }
}

/// Match an AI prediction array positionally onto `covenants`
pub fn parse_predictions(reply: &str, covenants: &[&Covenant]) -> Vec<RiskPrediction> {
    let Some(raw) = delimited(reply, '[', ']')
        .and_then(|json| serde_json::from_str::<Vec<RawPrediction>>(json).ok())
    else {
        return Vec::new();
    };

    covenants
        .iter()
        .zip(raw)
        .map(|(covenant, prediction)| RiskPrediction {
            covenant_id: covenant.id,
            covenant_title: covenant.title.clone(),
            current_value: covenant.value.clone().unwrap_or_else(|| "Pending".to_string()),
            threshold: covenant.threshold.clone().unwrap_or_else(|| "N/A".to_string()),
            predicted_breach_date: prediction
                .predicted_breach_date
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "N/A".to_string()),
            probability: probability_of(prediction.probability.as_ref()),
            trend: prediction
                .trend
                .and_then(|t| t.parse().ok())
                .unwrap_or(Trend::Stable),
            explanation: prediction
                .explanation
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "Analysis pending.".to_string()),
        })
        .collect()
}

/// Loan analysis backed by an optional text generator
#[derive(Clone)]
pub struct AiAdvisor {
    generator: Option<Arc<dyn TextGenerator>>,
    fallback: StatusBasedPredictor,
}

impl AiAdvisor {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        if generator.is_none() {
            info!("AI generator not configured; narratives will use automated fallbacks");
        }
        Self {
            generator,
            fallback: StatusBasedPredictor,
        }
    }

    /// Advisor that always answers with fallbacks
    pub fn offline() -> Self {
        Self {
            generator: None,
            fallback: StatusBasedPredictor,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    async fn generate(&self, purpose: &'static str, prompt: prompts::Prompt) -> Option<String> {
        let generator = self.generator.as_ref()?;
        match generator.complete(prompt.system, &prompt.user).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(purpose, error = %e, "AI generation failed, using fallback");
                None
            }
        }
    }

    /// Executive summary of a loan
    pub async fn summarize_loan(&self, loan: &Loan) -> Narrative {
        if let Some(text) = self.generate("loan_summary", prompts::loan_summary(loan)).await {
            return Narrative::ai(text);
        }

        let attention: Vec<&str> = loan
            .covenants
            .iter()
            .filter(|c| c.status.needs_attention())
            .map(|c| c.title.as_str())
            .collect();

        let mut text = format!(
            "{} holds a {} {} facility at {}% maturing {}. Compliance score is {}/100 with {} of {} covenants at risk or breached.",
            loan.borrower,
            loan.currency,
            loan.amount,
            loan.interest_rate,
            loan.maturity_date,
            loan.compliance_score,
            attention.len(),
            loan.covenants.len()
        );
        if !attention.is_empty() {
            text.push_str(&format!(" Requires attention: {}.", attention.join(", ")));
        }
        Narrative::fallback(text)
    }

    /// Explanation of one covenant's status
    pub async fn explain_covenant(&self, loan: &Loan, covenant: &Covenant) -> Narrative {
        if let Some(text) = self
            .generate(
                "covenant_explanation",
                prompts::covenant_explanation(loan, covenant),
            )
            .await
        {
            return Narrative::ai(text);
        }

        Narrative::fallback(format!(
            "{} ({}) is {}. Current value: {}. Threshold: {}. Due date: {}. {}",
            covenant.title,
            covenant.covenant_type,
            covenant.status,
            covenant.value.as_deref().unwrap_or("Not yet measured"),
            covenant.threshold.as_deref().unwrap_or("Not specified"),
            covenant.due_date,
            prompts::status_guidance(covenant.status)
        ))
    }

    /// Summary of the most recent timeline activity, with the number of events analysed
    pub async fn what_changed(&self, loan: &Loan) -> (Narrative, usize) {
        let recent: Vec<_> = loan
            .timeline_newest_first()
            .into_iter()
            .take(RECENT_EVENT_LIMIT)
            .collect();

        if recent.is_empty() {
            return (Narrative::fallback(NO_RECENT_CHANGES), 0);
        }

        let count = recent.len();
        if let Some(text) = self
            .generate("what_changed", prompts::what_changed(loan, &recent))
            .await
        {
            return (Narrative::ai(text), count);
        }

        let lines: Vec<String> = recent
            .iter()
            .map(|e| format!("- {} {}: {}", e.date, e.event_type, e.title))
            .collect();
        let text = format!(
            "{} recent event(s) for {} (compliance score {}/100):\n{}",
            count,
            loan.borrower,
            loan.compliance_score,
            lines.join("\n")
        );
        (Narrative::fallback(text), count)
    }

    /// Structured loan metadata from agreement text
    pub async fn extract_loan_dna(&self, document_text: &str) -> (ExtractionResult, NarrativeSource) {
        let text = truncate_chars(document_text, DOCUMENT_TEXT_LIMIT);
        let reply = self
            .generate("loan_dna_extraction", prompts::loan_dna_extraction(&text))
            .await;

        match reply.as_deref().and_then(parse_extraction) {
            Some(extraction) => (extraction, NarrativeSource::Ai),
            None => (fallback_extraction(reply.as_deref()), NarrativeSource::Fallback),
        }
    }
}

#[async_trait]
impl PredictionProvider for AiAdvisor {
    async fn predict(&self, loan: &Loan) -> ApiResult<PredictionReport> {
        let covenants = financial_covenants(loan);
        if covenants.is_empty() {
            let source = if self.is_configured() {
                NarrativeSource::Ai
            } else {
                NarrativeSource::Fallback
            };
            return Ok(PredictionReport::empty(source));
        }

        if let Some(reply) = self
            .generate(
                "risk_predictions",
                prompts::risk_predictions(loan, &covenants),
            )
            .await
        {
            let mut predictions = parse_predictions(&reply, &covenants);
            if !predictions.is_empty() {
                let received = predictions.len();
                let mut message = None;
                if received < covenants.len() {
                    warn!(
                        loan_id = %loan.id,
                        expected = covenants.len(),
                        received,
                        "AI reply omitted covenants, filling with status-based predictions"
                    );
                    predictions.extend(
                        covenants[received..]
                            .iter()
                            .map(|c| self.fallback.predict_covenant(c, loan.compliance_score)),
                    );
                    message = Some(format!(
                        "{} {} of {} predictions are status-based",
                        FALLBACK_LABEL,
                        covenants.len() - received,
                        covenants.len()
                    ));
                }
                return Ok(PredictionReport {
                    predictions,
                    source: NarrativeSource::Ai,
                    message,
                });
            }
            warn!(loan_id = %loan.id, "Unparseable prediction reply, using status-based predictions");
        }

        Ok(self.fallback.predict_loan(loan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiError;
    use crate::models::{CovenantStatus, CovenantType, LoanStatus};
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    struct Canned(Result<String, ()>);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, AiError> {
            self.0.clone().map_err(|_| AiError::EmptyResponse)
        }
    }

    fn advisor(reply: Result<&str, ()>) -> AiAdvisor {
        AiAdvisor::new(Some(Arc::new(Canned(reply.map(str::to_string)))))
    }

    fn covenant(title: &str, status: CovenantStatus) -> Covenant {
        Covenant {
            id: Uuid::new_v4(),
            title: title.to_string(),
            covenant_type: CovenantType::Financial,
            due_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            status,
            value: None,
            threshold: Some("3.0x".to_string()),
            description: String::new(),
            frequency: None,
            waiver_reason: None,
            waiver_date: None,
            waiver_approved_by: None,
        }
    }

    fn loan(covenants: Vec<Covenant>) -> Loan {
        Loan {
            id: Uuid::new_v4(),
            borrower: "Wayne Enterprises".to_string(),
            amount: Decimal::new(75_000_000, 0),
            currency: "USD".to_string(),
            interest_rate: Decimal::new(525, 2),
            start_date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            maturity_date: NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
            status: LoanStatus::Active,
            compliance_score: 50,
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
    fn test_delimited() {
        assert_eq!(delimited("Here: [1, 2] done", '[', ']'), Some("[1, 2]"));
        assert_eq!(delimited("no json", '{', '}'), None);
        assert_eq!(delimited("} backwards {", '{', '}'), None);
    }

    #[test]
    fn test_probability_parsing() {
        assert_eq!(probability_of(Some(&serde_json::json!(72.6))), 73);
        assert_eq!(probability_of(Some(&serde_json::json!("85%"))), 85);
        assert_eq!(probability_of(Some(&serde_json::json!(140))), 100);
        assert_eq!(probability_of(Some(&serde_json::json!(-3))), 0);
        assert_eq!(probability_of(None), 50);
    }

    #[test]
    fn test_parse_extraction_defaults_key_terms() {
        let reply = r#"Sure! {"extractedCovenants":[{"title":"Minimum EBITDA","type":"Financial","threshold":"$10M"}],"riskFactors":["FX exposure"]} Hope this helps."#;
        let extraction = parse_extraction(reply).unwrap();
        assert_eq!(extraction.confidence, 88);
        assert_eq!(extraction.key_terms, KeyTerms::default());
        assert_eq!(extraction.extracted_covenants.len(), 1);
        assert_eq!(extraction.summary, "Document analyzed successfully.");
    }

    #[test]
    fn test_fallback_extraction_is_labelled() {
        let extraction = fallback_extraction(Some("I could not read this"));
        assert_eq!(extraction.confidence, 75);
        assert_eq!(extraction.extracted_covenants[0].title, "Maximum Leverage Ratio");
        assert!(extraction.summary.starts_with(FALLBACK_LABEL));
    }

    #[tokio::test]
    async fn test_offline_summary_is_labelled() {
        let loan = loan(vec![covenant("Leverage", CovenantStatus::Breached)]);
        let narrative = AiAdvisor::offline().summarize_loan(&loan).await;

        assert_eq!(narrative.source, NarrativeSource::Fallback);
        assert!(narrative.text.starts_with(FALLBACK_LABEL));
        assert!(narrative.text.contains("Requires attention: Leverage."));
    }

    #[tokio::test]
    async fn test_generator_failure_falls_back() {
        let loan = loan(vec![covenant("Leverage", CovenantStatus::AtRisk)]);
        let narrative = advisor(Err(())).explain_covenant(&loan, &loan.covenants[0]).await;
        assert_eq!(narrative.source, NarrativeSource::Fallback);
        assert!(narrative.text.contains("approaching breach"));
    }

    #[tokio::test]
    async fn test_ai_predictions_matched_positionally() {
        let loan = loan(vec![
            covenant("Leverage", CovenantStatus::AtRisk),
            covenant("Interest Cover", CovenantStatus::Compliant),
        ]);
        let reply = r#"[{"probability": 64, "trend": "deteriorating", "predicted_breach_date": "2025-03-31", "explanation": "Leverage rising."},
                        {"probability": 12, "trend": "improving", "explanation": "Ample headroom."}]"#;

        let report = advisor(Ok(reply)).predict(&loan).await.unwrap();
        assert_eq!(report.source, NarrativeSource::Ai);
        assert_eq!(report.predictions.len(), 2);
        assert_eq!(report.predictions[0].covenant_title, "Leverage");
        assert_eq!(report.predictions[0].trend, Trend::Deteriorating);
        assert_eq!(report.predictions[1].predicted_breach_date, "N/A");
        assert_eq!(report.predictions[1].current_value, "Pending");
    }

    #[tokio::test]
    async fn test_short_prediction_reply_is_filled_from_status() {
        let loan = loan(vec![
            covenant("Leverage", CovenantStatus::AtRisk),
            covenant("Interest Cover", CovenantStatus::Breached),
        ]);
        let reply = r#"[{"probability": 64, "trend": "deteriorating", "explanation": "Leverage rising."}]"#;

        let report = advisor(Ok(reply)).predict(&loan).await.unwrap();
        assert_eq!(report.source, NarrativeSource::Ai);
        assert_eq!(report.predictions.len(), 2);
        assert_eq!(report.predictions[0].probability, 64);
        assert_eq!(report.predictions[1].covenant_title, "Interest Cover");
        assert_eq!(report.predictions[1].probability, 100);
        assert_eq!(
            report.message.as_deref(),
            Some("[Automated fallback] 1 of 2 predictions are status-based")
        );
    }

    #[tokio::test]
    async fn test_unparseable_predictions_use_status_provider() {
        let loan = loan(vec![covenant("Leverage", CovenantStatus::Breached)]);
        let report = advisor(Ok("I cannot help with that")).predict(&loan).await.unwrap();

        assert_eq!(report.source, NarrativeSource::Fallback);
        assert_eq!(report.predictions[0].probability, 100);
        assert_eq!(report.predictions[0].predicted_breach_date, "Already breached");
    }

    #[tokio::test]
    async fn test_what_changed_without_events() {
        let (narrative, count) = advisor(Ok("unused")).what_changed(&loan(Vec::new())).await;
        assert_eq!(count, 0);
        assert!(narrative.text.ends_with(NO_RECENT_CHANGES));
    }

    #[tokio::test]
    async fn test_extraction_uses_ai_reply() {
        let reply = r#"{"keyTerms":{"facilityType":"Revolving Credit Facility"},"summary":"RCF."}"#;
        let (extraction, source) = advisor(Ok(reply)).extract_loan_dna("agreement text").await;
        assert_eq!(source, NarrativeSource::Ai);
        assert_eq!(extraction.key_terms.facility_type, "Revolving Credit Facility");
        assert_eq!(extraction.key_terms.purpose, "General Corporate Purposes");
    }
}
