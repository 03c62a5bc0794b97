//! Loan service layer - every loan mutation flows through here
//!
//! Each operation loads the loan aggregate, applies a domain function from
//! the sibling modules and commits the result in one repository write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    ApplyExtractionRequest, Covenant, CovenantStatus, CovenantStatusResponse, CovenantWithLoan,
    CreateCovenantRequest, CreateLoanRequest, CreateTimelineEventRequest, DashboardStats,
    ExtractionApplied, Loan, LoanActivity, LoanDna, LoanRisk, LoanStats, LoanStatus, LoanSummary,
    RiskPrediction, ScoreRecalculation, TimelineEvent, TimelineEventType, UpdateCovenantRequest,
    UpdateCovenantStatusRequest, UpdateLoanRequest, UploadedDocument, DASHBOARD_RECENT_EVENTS,
    DASHBOARD_TOP_RISKS, newest_first,
};
use crate::repository::LoanRepository;
use crate::services::compliance::{compliance_score, CovenantBreakdown, FULL_COMPLIANCE};
use crate::services::covenant::{self, StatusChange};
use crate::services::export;
use crate::services::extraction;
use crate::services::prediction::{PredictionProvider, PredictionReport, HIGH_RISK_PROBABILITY};

const DEFAULT_CURRENCY: &str = "USD";

/// Downloadable CSV report
#[derive(Debug, Clone)]
pub struct CsvReport {
    pub filename: String,
    pub body: String,
}

/// Loan service for managing loans, covenants and their timeline
#[derive(Clone)]
pub struct LoanService {
    loans: Arc<dyn LoanRepository>,
    predictor: Arc<dyn PredictionProvider>,
    upload_dir: PathBuf,
}

impl LoanService {
    pub fn new(
        loans: Arc<dyn LoanRepository>,
        predictor: Arc<dyn PredictionProvider>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            loans,
            predictor,
            upload_dir: upload_dir.into(),
        }
    }

    async fn load(&self, loan_id: Uuid) -> ApiResult<Loan> {
        self.loans
            .get(loan_id)
            .await?
            .ok_or_else(|| ApiError::loan_not_found(loan_id))
    }

    async fn load_for_covenant(&self, covenant_id: Uuid) -> ApiResult<Loan> {
        let loan_id = self
            .loans
            .loan_id_for_covenant(covenant_id)
            .await?
            .ok_or_else(|| ApiError::covenant_not_found(covenant_id))?;
        self.load(loan_id).await
    }

    // ------------------------------------------------------------------
    // Loans
    // ------------------------------------------------------------------

    /// Loan list view, optionally filtered by status
    pub async fn list_loans(&self, status: Option<LoanStatus>) -> ApiResult<Vec<LoanSummary>> {
        let loans = self.loans.list().await?;
        Ok(loans
            .iter()
            .filter(|loan| status.map_or(true, |s| loan.status == s))
            .map(LoanSummary::from)
            .collect())
    }

    pub async fn get_loan(&self, loan_id: Uuid) -> ApiResult<Loan> {
        self.load(loan_id).await
    }

    /// Create a loan facility with a `Loan Created` event
    pub async fn create_loan(
        &self,
        request: CreateLoanRequest,
        created_by: Option<Uuid>,
    ) -> ApiResult<Loan> {
        validate_terms(
            request.amount,
            request.interest_rate,
            request.start_date,
            request.maturity_date,
        )?;

        let now = Utc::now();
        let borrower = request.borrower.trim().to_string();
        let currency =
            currency_code(request.currency).unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        let created = TimelineEvent::new(
            TimelineEventType::LoanCreated,
            now,
            "Loan Created",
            format!(
                "New loan facility created for {} with principal amount of {} {}.",
                borrower, currency, request.amount
            ),
        );

        let loan = Loan {
            id: Uuid::new_v4(),
            borrower,
            amount: request.amount,
            currency,
            interest_rate: request.interest_rate,
            start_date: request.start_date,
            maturity_date: request.maturity_date,
            status: request.status.unwrap_or_default(),
            compliance_score: FULL_COMPLIANCE,
            risk_summary: request.risk_summary,
            covenants: Vec::new(),
            timeline_events: vec![created],
            loan_dna: None,
            risk_predictions: Vec::new(),
            documents: Vec::new(),
            created_by,
            created_at: now,
            updated_at: now,
        };

        self.loans.insert(&loan).await?;
        info!(loan_id = %loan.id, borrower = %loan.borrower, "Loan created");

        Ok(loan)
    }

    /// Update loan fields; the compliance score is always derived
    pub async fn update_loan(&self, loan_id: Uuid, request: UpdateLoanRequest) -> ApiResult<Loan> {
        let mut loan = self.load(loan_id).await?;

        if let Some(borrower) = request.borrower {
            loan.borrower = borrower.trim().to_string();
        }
        if let Some(amount) = request.amount {
            loan.amount = amount;
        }
        if let Some(currency) = currency_code(request.currency) {
            loan.currency = currency;
        }
        if let Some(rate) = request.interest_rate {
            loan.interest_rate = rate;
        }
        if let Some(start) = request.start_date {
            loan.start_date = start;
        }
        if let Some(maturity) = request.maturity_date {
            loan.maturity_date = maturity;
        }
        if let Some(status) = request.status {
            loan.status = status;
        }
        if let Some(summary) = request.risk_summary {
            loan.risk_summary = Some(summary).filter(|s| !s.trim().is_empty());
        }

        validate_terms(
            loan.amount,
            loan.interest_rate,
            loan.start_date,
            loan.maturity_date,
        )?;

        loan.compliance_score = compliance_score(&loan.covenants);
        loan.updated_at = Utc::now();
        self.loans.save(&loan).await?;

        info!(loan_id = %loan.id, "Loan updated");
        Ok(loan)
    }

    pub async fn delete_loan(&self, loan_id: Uuid) -> ApiResult<()> {
        if !self.loans.delete(loan_id).await? {
            return Err(ApiError::loan_not_found(loan_id));
        }
        info!(loan_id = %loan_id, "Loan deleted");
        Ok(())
    }

    pub async fn loan_stats(&self, loan_id: Uuid) -> ApiResult<LoanStats> {
        let loan = self.load(loan_id).await?;
        let breakdown = CovenantBreakdown::of(&loan.covenants);

        Ok(LoanStats {
            total_covenants: breakdown.total,
            at_risk_count: breakdown.needing_attention(),
            compliance_score: loan.compliance_score,
            status: loan.status,
        })
    }

    /// Recompute and store the compliance score
    pub async fn recalculate_score(&self, loan_id: Uuid) -> ApiResult<ScoreRecalculation> {
        let mut loan = self.load(loan_id).await?;
        let old_score = loan.compliance_score;
        let new_score = compliance_score(&loan.covenants);

        if old_score != new_score {
            loan.compliance_score = new_score;
            loan.updated_at = Utc::now();
            self.loans.save(&loan).await?;
            info!(loan_id = %loan_id, old_score, new_score, "Compliance score corrected");
        }

        Ok(ScoreRecalculation {
            loan_id,
            old_score,
            new_score,
        })
    }

    // ------------------------------------------------------------------
    // Covenants
    // ------------------------------------------------------------------

    pub async fn add_covenant(
        &self,
        loan_id: Uuid,
        request: CreateCovenantRequest,
        actor: &str,
    ) -> ApiResult<Covenant> {
        let mut loan = self.load(loan_id).await?;
        let added = covenant::add_covenant(&mut loan, request, actor, Utc::now());
        self.loans.save(&loan).await?;

        info!(
            loan_id = %loan_id,
            covenant_id = %added.id,
            status = %added.status,
            compliance_score = loan.compliance_score,
            "Covenant added"
        );
        Ok(added)
    }

    /// Covenants across all loans, or of one loan
    pub async fn list_covenants(&self, loan_id: Option<Uuid>) -> ApiResult<Vec<CovenantWithLoan>> {
        let loans = match loan_id {
            Some(id) => vec![self.load(id).await?],
            None => self.loans.list().await?,
        };

        Ok(loans
            .into_iter()
            .flat_map(|loan| {
                let loan_id = loan.id;
                loan.covenants
                    .into_iter()
                    .map(move |covenant| CovenantWithLoan { loan_id, covenant })
            })
            .collect())
    }

    pub async fn get_covenant(&self, covenant_id: Uuid) -> ApiResult<CovenantWithLoan> {
        let loan = self.load_for_covenant(covenant_id).await?;
        let covenant = loan
            .covenant(covenant_id)
            .cloned()
            .ok_or_else(|| ApiError::covenant_not_found(covenant_id))?;

        Ok(CovenantWithLoan {
            loan_id: loan.id,
            covenant,
        })
    }

    pub async fn update_covenant(
        &self,
        covenant_id: Uuid,
        request: UpdateCovenantRequest,
        actor: &str,
    ) -> ApiResult<CovenantWithLoan> {
        let mut loan = self.load_for_covenant(covenant_id).await?;
        let previous_status = loan.covenant(covenant_id).map(|c| c.status);

        let (covenant, event) =
            covenant::edit_covenant(&mut loan, covenant_id, request, actor, Utc::now())?;
        self.loans.save(&loan).await?;

        info!(
            loan_id = %loan.id,
            covenant_id = %covenant_id,
            old_status = ?previous_status,
            new_status = %covenant.status,
            event_recorded = event.is_some(),
            "Covenant updated"
        );

        Ok(CovenantWithLoan {
            loan_id: loan.id,
            covenant,
        })
    }

    pub async fn delete_covenant(&self, covenant_id: Uuid) -> ApiResult<()> {
        let mut loan = self.load_for_covenant(covenant_id).await?;
        let removed = covenant::remove_covenant(&mut loan, covenant_id, Utc::now())?;
        self.loans.save(&loan).await?;

        info!(
            loan_id = %loan.id,
            covenant_id = %removed.id,
            compliance_score = loan.compliance_score,
            "Covenant deleted"
        );
        Ok(())
    }

    /// Status change for a covenant located by id
    pub async fn change_covenant_status(
        &self,
        covenant_id: Uuid,
        request: UpdateCovenantStatusRequest,
        actor: &str,
    ) -> ApiResult<CovenantStatusResponse> {
        let loan = self.load_for_covenant(covenant_id).await?;
        self.commit_status_change(loan, covenant_id, request, actor)
            .await
    }

    /// Status change for a covenant of a known loan
    pub async fn change_loan_covenant_status(
        &self,
        loan_id: Uuid,
        covenant_id: Uuid,
        request: UpdateCovenantStatusRequest,
        actor: &str,
    ) -> ApiResult<CovenantStatusResponse> {
        let loan = self.load(loan_id).await?;
        self.commit_status_change(loan, covenant_id, request, actor)
            .await
    }

    async fn commit_status_change(
        &self,
        mut loan: Loan,
        covenant_id: Uuid,
        request: UpdateCovenantStatusRequest,
        actor: &str,
    ) -> ApiResult<CovenantStatusResponse> {
        let outcome = covenant::apply_status_change(
            &mut loan,
            StatusChange {
                covenant_id,
                new_status: request.status,
                value: request.value,
                waiver_reason: request.waiver_reason,
            },
            actor,
            Utc::now(),
        )?;

        self.loans.save(&loan).await?;

        info!(
            loan_id = %loan.id,
            covenant_id = %covenant_id,
            old_status = %outcome.previous_status,
            new_status = %outcome.covenant.status,
            old_score = outcome.previous_score,
            new_score = outcome.compliance_score,
            "Covenant status changed"
        );
        if outcome.covenant.status == CovenantStatus::Breached {
            warn!(loan_id = %loan.id, covenant_id = %covenant_id, "Covenant breached");
        }

        Ok(CovenantStatusResponse {
            loan_id: loan.id,
            covenant: outcome.covenant,
            previous_status: outcome.previous_status,
            event: outcome.event,
            compliance_score: outcome.compliance_score,
        })
    }

    // ------------------------------------------------------------------
    // Timeline
    // ------------------------------------------------------------------

    /// Timeline, newest first
    pub async fn timeline(&self, loan_id: Uuid) -> ApiResult<Vec<TimelineEvent>> {
        Ok(self.load(loan_id).await?.timeline_newest_first())
    }

    /// Append a manual timeline entry
    pub async fn add_timeline_event(
        &self,
        loan_id: Uuid,
        request: CreateTimelineEventRequest,
    ) -> ApiResult<TimelineEvent> {
        let mut loan = self.load(loan_id).await?;

        if let Some(covenant_id) = request.related_covenant_id {
            if loan.covenant(covenant_id).is_none() {
                return Err(ApiError::BadRequest(format!(
                    "Covenant {} does not belong to loan {}",
                    covenant_id, loan_id
                )));
            }
        }

        let now = Utc::now();
        let mut event = TimelineEvent::new(
            request.event_type,
            now,
            request.title.trim(),
            request.description,
        );
        if let Some(date) = request.date {
            event.date = date;
        }
        event.related_covenant_id = request.related_covenant_id;
        event.metadata = request.metadata;

        loan.timeline_events.push(event.clone());
        loan.updated_at = now;
        self.loans.save(&loan).await?;

        info!(loan_id = %loan_id, event_type = %event.event_type, "Timeline event recorded");
        Ok(event)
    }

    // ------------------------------------------------------------------
    // Extraction, predictions and documents
    // ------------------------------------------------------------------

    /// Apply an extraction result atomically
    pub async fn apply_extraction(
        &self,
        loan_id: Uuid,
        request: ApplyExtractionRequest,
    ) -> ApiResult<ExtractionApplied> {
        let mut loan = self.load(loan_id).await?;
        let applied = extraction::apply_extraction(
            &mut loan,
            request.extraction,
            request.filename.trim(),
            Utc::now(),
        );
        self.loans.save(&loan).await?;

        info!(
            loan_id = %loan_id,
            added = applied.added_covenant_ids.len(),
            compliance_score = applied.compliance_score,
            "Extraction applied"
        );
        Ok(applied)
    }

    pub async fn loan_dna(&self, loan_id: Uuid) -> ApiResult<Option<LoanDna>> {
        Ok(self.load(loan_id).await?.loan_dna)
    }

    /// Stored predictions
    pub async fn predictions(&self, loan_id: Uuid) -> ApiResult<Vec<RiskPrediction>> {
        Ok(self.load(loan_id).await?.risk_predictions)
    }

    /// Run the prediction provider and store its result
    pub async fn refresh_predictions(&self, loan_id: Uuid) -> ApiResult<PredictionReport> {
        let mut loan = self.load(loan_id).await?;
        let report = self.predictor.predict(&loan).await?;

        loan.risk_predictions = report.predictions.clone();
        loan.updated_at = Utc::now();
        self.loans.save(&loan).await?;

        let high_risk = report
            .predictions
            .iter()
            .filter(|p| p.probability > HIGH_RISK_PROBABILITY)
            .count();
        info!(
            loan_id = %loan_id,
            predictions = report.predictions.len(),
            high_risk,
            source = ?report.source,
            "Risk predictions refreshed"
        );
        Ok(report)
    }

    /// Store an uploaded document and record a `Document Uploaded` event
    pub async fn upload_document(
        &self,
        loan_id: Uuid,
        filename: &str,
        bytes: &[u8],
    ) -> ApiResult<UploadedDocument> {
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
        }

        let mut loan = self.load(loan_id).await?;
        let now = Utc::now();
        let id = Uuid::new_v4();
        let safe_name = sanitize_filename(filename);

        let dir = self.upload_dir.join(loan_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}_{}", id.simple(), safe_name));
        tokio::fs::write(&path, bytes).await?;

        let document = UploadedDocument {
            id,
            filename: safe_name,
            stored_path: path_string(&path),
            size_bytes: bytes.len() as i64,
            sha256: hex::encode(Sha256::digest(bytes)),
            uploaded_at: now,
        };

        let event = TimelineEvent::new(
            TimelineEventType::DocumentUploaded,
            now,
            "Document Uploaded",
            format!(
                "Document \"{}\" uploaded ({} bytes).",
                document.filename, document.size_bytes
            ),
        )
        .with_metadata(json!({
            "documentId": document.id,
            "filename": document.filename,
            "sha256": document.sha256,
        }));

        loan.documents.push(document.clone());
        loan.timeline_events.push(event);
        loan.updated_at = now;

        if let Err(e) = self.loans.save(&loan).await {
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }

        info!(
            loan_id = %loan_id,
            document_id = %document.id,
            size_bytes = document.size_bytes,
            "Document uploaded"
        );
        Ok(document)
    }

    pub async fn list_documents(&self, loan_id: Uuid) -> ApiResult<Vec<UploadedDocument>> {
        Ok(self.load(loan_id).await?.documents)
    }

    // ------------------------------------------------------------------
    // Portfolio views
    // ------------------------------------------------------------------

    pub async fn dashboard_stats(&self) -> ApiResult<DashboardStats> {
        let loans = self.loans.list().await?;

        let mut total_covenants = 0;
        let mut at_risk_covenants = 0;
        let mut breached_covenants = 0;
        for loan in &loans {
            let breakdown = CovenantBreakdown::of(&loan.covenants);
            total_covenants += breakdown.total;
            at_risk_covenants += breakdown.needing_attention();
            breached_covenants += breakdown.breached;
        }

        let avg_score = if loans.is_empty() {
            0
        } else {
            let total: i64 = loans.iter().map(|l| i64::from(l.compliance_score)).sum();
            let count = loans.len() as i64;
            ((total * 2 + count) / (count * 2)) as i32
        };

        let mut top_risks: Vec<LoanRisk> = loans
            .iter()
            .flat_map(|loan| {
                loan.risk_predictions
                    .iter()
                    .filter(|p| p.probability > HIGH_RISK_PROBABILITY)
                    .map(|p| LoanRisk {
                        loan_id: loan.id,
                        borrower: loan.borrower.clone(),
                        prediction: p.clone(),
                    })
            })
            .collect();
        top_risks.sort_by(|a, b| b.prediction.probability.cmp(&a.prediction.probability));
        top_risks.truncate(DASHBOARD_TOP_RISKS);

        let mut recent: Vec<(usize, &Loan, &TimelineEvent)> = loans
            .iter()
            .flat_map(|loan| {
                loan.timeline_events
                    .iter()
                    .enumerate()
                    .map(move |(index, event)| (index, loan, event))
            })
            .collect();
        recent.sort_by(|(ia, _, a), (ib, _, b)| newest_first(a, *ia, b, *ib));
        let recent_events: Vec<LoanActivity> = recent
            .into_iter()
            .take(DASHBOARD_RECENT_EVENTS)
            .map(|(_, loan, event)| LoanActivity {
                loan_id: loan.id,
                borrower: loan.borrower.clone(),
                event: event.clone(),
            })
            .collect();

        Ok(DashboardStats {
            total_loans: loans.len(),
            total_covenants,
            at_risk_covenants,
            breached_covenants,
            avg_score,
            top_risks,
            recent_events,
        })
    }

    /// CSV report for one loan
    pub async fn export_csv(&self, loan_id: Uuid) -> ApiResult<CsvReport> {
        let loan = self.load(loan_id).await?;
        Ok(CsvReport {
            filename: export::report_filename(&loan),
            body: export::write_loan_csv(&loan, Utc::now().date_naive()),
        })
    }
}

/// Upper-cased currency code, `None` when blank
fn currency_code(currency: Option<String>) -> Option<String> {
    currency
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
}

fn validate_terms(
    amount: Decimal,
    interest_rate: Decimal,
    start: chrono::NaiveDate,
    maturity: chrono::NaiveDate,
) -> ApiResult<()> {
    if amount <= Decimal::ZERO {
        return Err(ApiError::ValidationError(
            "amount: must be greater than zero".to_string(),
        ));
    }
    if interest_rate < Decimal::ZERO {
        return Err(ApiError::ValidationError(
            "interestRate: must not be negative".to_string(),
        ));
    }
    if maturity < start {
        return Err(ApiError::ValidationError(
            "maturityDate: must not be before startDate".to_string(),
        ));
    }
    Ok(())
}

/// Base name of an uploaded file restricted to a safe character set
fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\Credit Agreement.pdf"), "Credit_Agreement.pdf");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename(""), "document");
    }

    #[test]
    fn test_currency_code() {
        assert_eq!(currency_code(Some(" eur ".to_string())).as_deref(), Some("EUR"));
        assert_eq!(currency_code(Some("   ".to_string())), None);
        assert_eq!(currency_code(None), None);
    }

    #[test]
    fn test_validate_terms() {
        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let maturity = chrono::NaiveDate::from_ymd_opt(2029, 1, 1).unwrap();

        assert!(validate_terms(Decimal::new(100, 0), Decimal::new(5, 0), start, maturity).is_ok());
        assert!(validate_terms(Decimal::ZERO, Decimal::new(5, 0), start, maturity).is_err());
        assert!(validate_terms(Decimal::new(100, 0), Decimal::new(-1, 0), start, maturity).is_err());
        assert!(validate_terms(Decimal::new(100, 0), Decimal::new(5, 0), maturity, start).is_err());
    }
}
