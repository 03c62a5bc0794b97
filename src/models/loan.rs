//! Loan aggregate models
//!
//! A [`Loan`] owns its covenants, its append-only timeline, the extracted
//! document metadata ("Loan DNA"), the latest risk predictions and the
//! references to uploaded documents. Everything is serialized in camelCase,
//! which is the wire format the dashboard consumes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Loan facility status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Default)]
#[sqlx(type_name = "loan_status")]
pub enum LoanStatus {
    #[default]
    Active,
    Pending,
    Closed,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "Active",
            LoanStatus::Pending => "Pending",
            LoanStatus::Closed => "Closed",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Covenant category
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "covenant_type")]
pub enum CovenantType {
    Financial,
    Reporting,
    Affirmative,
    Negative,
}

impl CovenantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CovenantType::Financial => "Financial",
            CovenantType::Reporting => "Reporting",
            CovenantType::Affirmative => "Affirmative",
            CovenantType::Negative => "Negative",
        }
    }

    /// Parse a free-form type label produced by document extraction.
    ///
    /// Labels such as `"financial covenant"` or `"Reporting|Affirmative"` are
    /// matched on their leading word; anything unrecognised is treated as a
    /// financial covenant.
    pub fn from_label(label: &str) -> Self {
        let head = label
            .split(|c: char| !c.is_ascii_alphabetic())
            .find(|part| !part.is_empty())
            .unwrap_or_default();

        head.parse().unwrap_or(CovenantType::Financial)
    }
}

impl fmt::Display for CovenantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CovenantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "financial" => Ok(CovenantType::Financial),
            "reporting" => Ok(CovenantType::Reporting),
            "affirmative" => Ok(CovenantType::Affirmative),
            "negative" => Ok(CovenantType::Negative),
            other => Err(format!("Unknown covenant type: '{}'", other)),
        }
    }
}

/// Covenant compliance status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "covenant_status")]
pub enum CovenantStatus {
    Compliant,
    #[serde(rename = "At Risk")]
    #[sqlx(rename = "At Risk")]
    AtRisk,
    Breached,
    Upcoming,
    Waived,
}

impl CovenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CovenantStatus::Compliant => "Compliant",
            CovenantStatus::AtRisk => "At Risk",
            CovenantStatus::Breached => "Breached",
            CovenantStatus::Upcoming => "Upcoming",
            CovenantStatus::Waived => "Waived",
        }
    }

    /// Statuses that count towards the compliance score
    pub fn is_compliant_equivalent(&self) -> bool {
        matches!(
            self,
            CovenantStatus::Compliant | CovenantStatus::Waived | CovenantStatus::Upcoming
        )
    }

    /// Statuses surfaced as "at risk" on dashboards
    pub fn needs_attention(&self) -> bool {
        matches!(self, CovenantStatus::AtRisk | CovenantStatus::Breached)
    }
}

impl fmt::Display for CovenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CovenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "compliant" => Ok(CovenantStatus::Compliant),
            "at risk" | "atrisk" => Ok(CovenantStatus::AtRisk),
            "breached" => Ok(CovenantStatus::Breached),
            "upcoming" => Ok(CovenantStatus::Upcoming),
            "waived" => Ok(CovenantStatus::Waived),
            other => Err(format!("Unknown covenant status: '{}'", other)),
        }
    }
}

/// Timeline event category
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "timeline_event_type")]
pub enum TimelineEventType {
    #[serde(rename = "Loan Created")]
    #[sqlx(rename = "Loan Created")]
    LoanCreated,
    #[serde(rename = "Covenant Added")]
    #[sqlx(rename = "Covenant Added")]
    CovenantAdded,
    #[serde(rename = "Status Changed")]
    #[sqlx(rename = "Status Changed")]
    StatusChanged,
    #[serde(rename = "Waiver Granted")]
    #[sqlx(rename = "Waiver Granted")]
    WaiverGranted,
    #[serde(rename = "Payment Received")]
    #[sqlx(rename = "Payment Received")]
    PaymentReceived,
    #[serde(rename = "Document Uploaded")]
    #[sqlx(rename = "Document Uploaded")]
    DocumentUploaded,
    #[serde(rename = "Risk Alert")]
    #[sqlx(rename = "Risk Alert")]
    RiskAlert,
    #[serde(rename = "Amendment Made")]
    #[sqlx(rename = "Amendment Made")]
    AmendmentMade,
}

impl TimelineEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineEventType::LoanCreated => "Loan Created",
            TimelineEventType::CovenantAdded => "Covenant Added",
            TimelineEventType::StatusChanged => "Status Changed",
            TimelineEventType::WaiverGranted => "Waiver Granted",
            TimelineEventType::PaymentReceived => "Payment Received",
            TimelineEventType::DocumentUploaded => "Document Uploaded",
            TimelineEventType::RiskAlert => "Risk Alert",
            TimelineEventType::AmendmentMade => "Amendment Made",
        }
    }
}

impl fmt::Display for TimelineEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a covenant metric
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "prediction_trend", rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Deteriorating,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Deteriorating => "deteriorating",
        }
    }
}

impl FromStr for Trend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "improving" => Ok(Trend::Improving),
            "stable" => Ok(Trend::Stable),
            "deteriorating" => Ok(Trend::Deteriorating),
            other => Err(format!("Unknown trend: '{}'", other)),
        }
    }
}

/// A monitored covenant, owned by exactly one loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Covenant {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub covenant_type: CovenantType,
    pub due_date: NaiveDate,
    pub status: CovenantStatus,
    pub value: Option<String>,
    pub threshold: Option<String>,
    #[serde(default)]
    pub description: String,
    pub frequency: Option<String>,
    pub waiver_reason: Option<String>,
    pub waiver_date: Option<NaiveDate>,
    pub waiver_approved_by: Option<String>,
}

impl Covenant {
    /// True when any waiver field is populated
    pub fn has_waiver(&self) -> bool {
        self.waiver_reason.is_some() || self.waiver_date.is_some() || self.waiver_approved_by.is_some()
    }

    pub fn clear_waiver(&mut self) {
        self.waiver_reason = None;
        self.waiver_date = None;
        self.waiver_approved_by = None;
    }
}

/// Immutable audit entry appended to a loan's timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: TimelineEventType,
    pub date: NaiveDate,
    pub title: String,
    pub description: String,
    pub related_covenant_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl TimelineEvent {
    pub fn new(
        event_type: TimelineEventType,
        at: DateTime<Utc>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            date: at.date_naive(),
            title: title.into(),
            description: description.into(),
            related_covenant_id: None,
            metadata: None,
            created_at: at,
        }
    }

    pub fn for_covenant(mut self, covenant_id: Uuid) -> Self {
        self.related_covenant_id = Some(covenant_id);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Structural terms pulled out of a loan agreement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyTerms {
    pub facility_type: String,
    pub purpose: String,
    pub security_type: String,
    pub governing_law: String,
}

impl Default for KeyTerms {
    fn default() -> Self {
        Self {
            facility_type: "Term Loan".to_string(),
            purpose: "General Corporate Purposes".to_string(),
            security_type: "Senior Secured".to_string(),
            governing_law: "New York".to_string(),
        }
    }
}

/// Covenant proposed by document extraction, before it is monitored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedCovenant {
    pub title: String,
    #[serde(rename = "type", default = "default_proposed_type")]
    pub covenant_type: String,
    #[serde(default)]
    pub threshold: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub description: String,
}

fn default_proposed_type() -> String {
    CovenantType::Financial.as_str().to_string()
}

/// Output of the document-extraction collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub confidence: i32,
    #[serde(default)]
    pub key_terms: KeyTerms,
    #[serde(default)]
    pub extracted_covenants: Vec<ProposedCovenant>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

/// Extracted document metadata attached to a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanDna {
    pub extracted_at: NaiveDate,
    pub source_document: String,
    pub confidence: i32,
    pub summary: String,
    pub key_terms: KeyTerms,
    pub extracted_covenants: Vec<ProposedCovenant>,
    pub risk_factors: Vec<String>,
}

impl LoanDna {
    pub fn from_extraction(
        extraction: ExtractionResult,
        source_document: impl Into<String>,
        extracted_at: NaiveDate,
    ) -> Self {
        Self {
            extracted_at,
            source_document: source_document.into(),
            confidence: extraction.confidence.clamp(0, 100),
            summary: extraction.summary,
            key_terms: extraction.key_terms,
            extracted_covenants: extraction.extracted_covenants,
            risk_factors: extraction.risk_factors,
        }
    }
}

/// Breach prediction for a single covenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskPrediction {
    pub covenant_id: Uuid,
    pub covenant_title: String,
    pub current_value: String,
    pub threshold: String,
    pub predicted_breach_date: String,
    pub probability: i32,
    pub trend: Trend,
    pub explanation: String,
}

/// Reference to a stored document upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedDocument {
    pub id: Uuid,
    pub filename: String,
    pub stored_path: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Loan facility aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: Uuid,
    pub borrower: String,
    pub amount: Decimal,
    pub currency: String,
    pub interest_rate: Decimal,
    pub start_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub status: LoanStatus,
    pub compliance_score: i32,
    pub risk_summary: Option<String>,
    pub covenants: Vec<Covenant>,
    pub timeline_events: Vec<TimelineEvent>,
    #[serde(rename = "loanDNA")]
    pub loan_dna: Option<LoanDna>,
    pub risk_predictions: Vec<RiskPrediction>,
    #[serde(rename = "uploadedDocuments")]
    pub documents: Vec<UploadedDocument>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn covenant(&self, covenant_id: Uuid) -> Option<&Covenant> {
        self.covenants.iter().find(|c| c.id == covenant_id)
    }

    pub fn covenant_mut(&mut self, covenant_id: Uuid) -> Option<&mut Covenant> {
        self.covenants.iter_mut().find(|c| c.id == covenant_id)
    }

    /// Timeline ordered newest first; events recorded together keep
    /// reverse append order.
    pub fn timeline_newest_first(&self) -> Vec<TimelineEvent> {
        let mut events: Vec<(usize, &TimelineEvent)> =
            self.timeline_events.iter().enumerate().collect();
        events.sort_by(|(ia, a), (ib, b)| newest_first(a, *ia, b, *ib));
        events.into_iter().map(|(_, e)| e.clone()).collect()
    }
}

/// Newest-first ordering of two events by date, creation time, then the
/// position each was appended at
pub fn newest_first(
    a: &TimelineEvent,
    a_index: usize,
    b: &TimelineEvent,
    b_index: usize,
) -> std::cmp::Ordering {
    b.date
        .cmp(&a.date)
        .then(b.created_at.cmp(&a.created_at))
        .then(b_index.cmp(&a_index))
}

/// Lightweight loan projection for list views
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanSummary {
    pub id: Uuid,
    pub borrower: String,
    pub amount: Decimal,
    pub currency: String,
    pub interest_rate: Decimal,
    pub start_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub status: LoanStatus,
    pub compliance_score: i32,
    pub covenants_count: usize,
}

impl From<&Loan> for LoanSummary {
    fn from(loan: &Loan) -> Self {
        Self {
            id: loan.id,
            borrower: loan.borrower.clone(),
            amount: loan.amount,
            currency: loan.currency.clone(),
            interest_rate: loan.interest_rate,
            start_date: loan.start_date,
            maturity_date: loan.maturity_date,
            status: loan.status,
            compliance_score: loan.compliance_score,
            covenants_count: loan.covenants.len(),
        }
    }
}

/// Covenant together with the loan that owns it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CovenantWithLoan {
    pub loan_id: Uuid,
    #[serde(flatten)]
    pub covenant: Covenant,
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request to create a new loan facility
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoanRequest {
    #[validate(length(min = 1, max = 255))]
    pub borrower: String,
    pub amount: Decimal,
    #[validate(length(min = 3, max = 10))]
    pub currency: Option<String>,
    pub interest_rate: Decimal,
    pub start_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub status: Option<LoanStatus>,
    pub risk_summary: Option<String>,
}

/// Partial update of loan fields; the compliance score is derived and not writable
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLoanRequest {
    #[validate(length(min = 1, max = 255))]
    pub borrower: Option<String>,
    pub amount: Option<Decimal>,
    #[validate(length(min = 3, max = 10))]
    pub currency: Option<String>,
    pub interest_rate: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub maturity_date: Option<NaiveDate>,
    pub status: Option<LoanStatus>,
    pub risk_summary: Option<String>,
}

/// Query for listing loans
#[derive(Debug, Default, Deserialize)]
pub struct ListLoansQuery {
    pub status: Option<LoanStatus>,
}

/// Request to add a covenant to a loan
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCovenantRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[serde(rename = "type")]
    pub covenant_type: CovenantType,
    pub due_date: NaiveDate,
    pub status: Option<CovenantStatus>,
    #[validate(length(max = 100))]
    pub value: Option<String>,
    #[validate(length(max = 100))]
    pub threshold: Option<String>,
    #[serde(default)]
    pub description: String,
    #[validate(length(max = 50))]
    pub frequency: Option<String>,
    pub waiver_reason: Option<String>,
}

/// Partial covenant edit; a status change is routed through the status transition
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCovenantRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub covenant_type: Option<CovenantType>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<CovenantStatus>,
    #[validate(length(max = 100))]
    pub value: Option<String>,
    #[validate(length(max = 100))]
    pub threshold: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub frequency: Option<String>,
    pub waiver_reason: Option<String>,
}

/// Query for listing covenants
#[derive(Debug, Default, Deserialize)]
pub struct ListCovenantsQuery {
    pub loan_id: Option<Uuid>,
}

/// Request to change a covenant's status
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCovenantStatusRequest {
    pub status: CovenantStatus,
    #[validate(length(max = 100))]
    pub value: Option<String>,
    pub waiver_reason: Option<String>,
}

/// Result of a covenant status change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CovenantStatusResponse {
    pub loan_id: Uuid,
    pub covenant: Covenant,
    pub previous_status: CovenantStatus,
    pub event: Option<TimelineEvent>,
    pub compliance_score: i32,
}

/// Request to append a manual timeline entry
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimelineEventRequest {
    #[serde(rename = "type")]
    pub event_type: TimelineEventType,
    pub date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub related_covenant_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

/// Request to materialize an extraction result on a loan
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplyExtractionRequest {
    pub extraction: ExtractionResult,
    #[validate(length(min = 1, max = 255))]
    pub filename: String,
}

/// Result of applying an extraction result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionApplied {
    pub loan_id: Uuid,
    pub added_covenant_ids: Vec<Uuid>,
    pub event_ids: Vec<Uuid>,
    pub compliance_score: i32,
}

/// Per-loan covenant statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanStats {
    pub total_covenants: usize,
    pub at_risk_count: usize,
    pub compliance_score: i32,
    pub status: LoanStatus,
}

/// Outcome of an explicit compliance recalculation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecalculation {
    pub loan_id: Uuid,
    pub old_score: i32,
    pub new_score: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covenant_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&CovenantStatus::AtRisk).unwrap(),
            "\"At Risk\""
        );
        let parsed: CovenantStatus = serde_json::from_str("\"Waived\"").unwrap();
        assert_eq!(parsed, CovenantStatus::Waived);
    }

    #[test]
    fn test_covenant_status_from_str_is_lenient() {
        assert_eq!("at risk".parse::<CovenantStatus>().unwrap(), CovenantStatus::AtRisk);
        assert_eq!("AT_RISK".parse::<CovenantStatus>().unwrap(), CovenantStatus::AtRisk);
        assert!("unknown".parse::<CovenantStatus>().is_err());
    }

    #[test]
    fn test_covenant_type_from_label() {
        assert_eq!(CovenantType::from_label("Reporting"), CovenantType::Reporting);
        assert_eq!(CovenantType::from_label("negative pledge"), CovenantType::Negative);
        assert_eq!(
            CovenantType::from_label("Financial|Reporting|Affirmative|Negative"),
            CovenantType::Financial
        );
        assert_eq!(CovenantType::from_label("ratio"), CovenantType::Financial);
        assert_eq!(CovenantType::from_label(""), CovenantType::Financial);
    }

    #[test]
    fn test_timeline_event_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&TimelineEventType::WaiverGranted).unwrap(),
            "\"Waiver Granted\""
        );
    }

    #[test]
    fn test_key_terms_fill_missing_fields() {
        let terms: KeyTerms = serde_json::from_str(r#"{"facilityType":"Revolver"}"#).unwrap();
        assert_eq!(terms.facility_type, "Revolver");
        assert_eq!(terms.governing_law, "New York");
    }

    #[test]
    fn test_proposed_covenant_defaults() {
        let proposal: ProposedCovenant =
            serde_json::from_str(r#"{"title":"Interest Cover"}"#).unwrap();
        assert_eq!(proposal.covenant_type, "Financial");
        assert!(proposal.threshold.is_none());
        assert!(proposal.description.is_empty());
    }
}
