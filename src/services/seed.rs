//! Demo portfolio for local development

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    ApplyExtractionRequest, CovenantStatus, CreateLoanRequest, ExtractionResult, KeyTerms,
    LoanStatus, ProposedCovenant, UpdateCovenantStatusRequest,
};

use super::LoanService;

const SEED_ACTOR: &str = "Demo Seeder";

struct DemoCovenant {
    title: &'static str,
    covenant_type: &'static str,
    threshold: &'static str,
    frequency: &'static str,
    description: &'static str,
    status: CovenantStatus,
    value: Option<&'static str>,
    waiver_reason: Option<&'static str>,
}

struct DemoLoan {
    borrower: &'static str,
    amount: i64,
    interest_rate: Decimal,
    start: (i32, u32, u32),
    maturity: (i32, u32, u32),
    document: &'static str,
    confidence: i32,
    key_terms: [&'static str; 4],
    risk_factors: &'static [&'static str],
    summary: &'static str,
    covenants: Vec<DemoCovenant>,
}

fn date((y, m, d): (i32, u32, u32)) -> ApiResult<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
        .ok_or_else(|| ApiError::InternalError(format!("invalid seed date {}-{}-{}", y, m, d)))
}

fn demo_portfolio() -> Vec<DemoLoan> {
    vec![
        DemoLoan {
            borrower: "Acme Corp Industrial",
            amount: 15_000_000,
            interest_rate: Decimal::new(55, 1),
            start: (2023, 1, 15),
            maturity: (2028, 1, 15),
            document: "loan_agreement_acme.pdf",
            confidence: 94,
            key_terms: [
                "Term Loan B",
                "Working Capital & Expansion",
                "Senior Secured",
                "New York",
            ],
            risk_factors: &[
                "High leverage in cyclical industry",
                "Concentration risk in single market segment",
                "Upcoming capex requirements may strain cash flow",
            ],
            summary: "Senior secured term loan for industrial manufacturing company with standard financial covenants. Moderate risk profile with tight leverage headroom.",
            covenants: vec![
                DemoCovenant {
                    title: "Quarterly Financials",
                    covenant_type: "Reporting",
                    threshold: "Within 45 days",
                    frequency: "Quarterly",
                    description: "Submission of unaudited quarterly financial statements within 45 days of quarter end.",
                    status: CovenantStatus::Compliant,
                    value: None,
                    waiver_reason: None,
                },
                DemoCovenant {
                    title: "Leverage Ratio",
                    covenant_type: "Financial",
                    threshold: "< 4.0x",
                    frequency: "Quarterly",
                    description: "Total Net Debt to EBITDA must not exceed 4.0x.",
                    status: CovenantStatus::AtRisk,
                    value: Some("3.9x"),
                    waiver_reason: None,
                },
                DemoCovenant {
                    title: "Interest Coverage",
                    covenant_type: "Financial",
                    threshold: "> 2.5x",
                    frequency: "Quarterly",
                    description: "EBITDA to Interest Expense ratio must be maintained above 2.5x.",
                    status: CovenantStatus::Upcoming,
                    value: None,
                    waiver_reason: None,
                },
            ],
        },
        DemoLoan {
            borrower: "Helios Energy Ltd",
            amount: 45_000_000,
            interest_rate: Decimal::new(62, 1),
            start: (2022, 6, 1),
            maturity: (2027, 6, 1),
            document: "helios_facility_agreement.pdf",
            confidence: 91,
            key_terms: [
                "Revolving Credit Facility",
                "Project Finance - Solar Installation",
                "Asset-Backed",
                "Delaware",
            ],
            risk_factors: &[
                "Project execution risk on new installations",
                "Regulatory dependency on renewable energy incentives",
                "Weather-related revenue variability",
            ],
            summary: "Asset-backed revolving facility for renewable energy company. Higher risk profile due to project execution dependencies and regulatory exposure.",
            covenants: vec![
                DemoCovenant {
                    title: "Debt Service Coverage",
                    covenant_type: "Financial",
                    threshold: "> 1.25x",
                    frequency: "Quarterly",
                    description: "DSCR on rolling 12-month basis must remain above 1.25x.",
                    status: CovenantStatus::Breached,
                    value: Some("1.18x"),
                    waiver_reason: None,
                },
                DemoCovenant {
                    title: "Annual Audit",
                    covenant_type: "Reporting",
                    threshold: "Within 90 days",
                    frequency: "Annual",
                    description: "Audited financials by Big 4 firm within 90 days of fiscal year end.",
                    status: CovenantStatus::Waived,
                    value: None,
                    waiver_reason: Some("Auditor transition approved by lender group"),
                },
            ],
        },
    ]
}

/// Create the demo portfolio through the service so seeded loans obey the
/// same invariants as user-created ones
pub async fn seed_demo_data(service: &LoanService) -> ApiResult<usize> {
    let portfolio = demo_portfolio();
    let count = portfolio.len();

    for demo in portfolio {
        let loan = service
            .create_loan(
                CreateLoanRequest {
                    borrower: demo.borrower.to_string(),
                    amount: Decimal::from(demo.amount),
                    currency: Some("USD".to_string()),
                    interest_rate: demo.interest_rate,
                    start_date: date(demo.start)?,
                    maturity_date: date(demo.maturity)?,
                    status: Some(LoanStatus::Active),
                    risk_summary: None,
                },
                None,
            )
            .await?;

        let [facility_type, purpose, security_type, governing_law] = demo.key_terms;
        let extraction = ExtractionResult {
            confidence: demo.confidence,
            key_terms: KeyTerms {
                facility_type: facility_type.to_string(),
                purpose: purpose.to_string(),
                security_type: security_type.to_string(),
                governing_law: governing_law.to_string(),
            },
            extracted_covenants: demo
                .covenants
                .iter()
                .map(|c| ProposedCovenant {
                    title: c.title.to_string(),
                    covenant_type: c.covenant_type.to_string(),
                    threshold: Some(c.threshold.to_string()),
                    frequency: Some(c.frequency.to_string()),
                    description: c.description.to_string(),
                })
                .collect(),
            risk_factors: demo.risk_factors.iter().map(|r| r.to_string()).collect(),
            summary: demo.summary.to_string(),
        };

        let applied = service
            .apply_extraction(
                loan.id,
                ApplyExtractionRequest {
                    extraction,
                    filename: demo.document.to_string(),
                },
            )
            .await?;

        for (covenant_id, demo_covenant) in applied.added_covenant_ids.iter().zip(&demo.covenants) {
            if demo_covenant.status == CovenantStatus::Upcoming {
                continue;
            }
            service
                .change_loan_covenant_status(
                    loan.id,
                    *covenant_id,
                    UpdateCovenantStatusRequest {
                        status: demo_covenant.status,
                        value: demo_covenant.value.map(str::to_string),
                        waiver_reason: demo_covenant.waiver_reason.map(str::to_string),
                    },
                    SEED_ACTOR,
                )
                .await?;
        }

        service.refresh_predictions(loan.id).await?;
    }

    info!(loans = count, "Demo portfolio seeded");
    Ok(count)
}
