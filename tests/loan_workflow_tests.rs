//! Loan workflow tests against the in-memory store
//!
//! These drive the loan service end to end: compliance scoring, status
//! transitions and waivers, the audit timeline, extraction and the CSV report.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use coven_server::error::ApiError;
use coven_server::models::{
    ApplyExtractionRequest, CovenantStatus, CovenantType, CreateCovenantRequest, CreateLoanRequest,
    CreateTimelineEventRequest, ExtractionResult, KeyTerms, Loan, ProposedCovenant,
    TimelineEventType, UpdateCovenantStatusRequest, UpdateLoanRequest,
};
use coven_server::repository::InMemoryLoanRepository;
use coven_server::services::export::{read_covenant_table, CovenantRow};
use coven_server::services::{LoanService, StatusBasedPredictor};

const OFFICER: &str = "Jane Officer";

fn service() -> LoanService {
    let upload_dir = std::env::temp_dir().join(format!("coven-tests-{}", Uuid::new_v4().simple()));
    LoanService::new(
        Arc::new(InMemoryLoanRepository::new()),
        Arc::new(StatusBasedPredictor),
        upload_dir,
    )
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn loan_request(borrower: &str) -> CreateLoanRequest {
    CreateLoanRequest {
        borrower: borrower.to_string(),
        amount: Decimal::new(25_000_000, 0),
        currency: None,
        interest_rate: Decimal::new(525, 2),
        start_date: date(2024, 1, 15),
        maturity_date: date(2029, 1, 15),
        status: None,
        risk_summary: None,
    }
}

fn covenant_request(title: &str, status: CovenantStatus) -> CreateCovenantRequest {
    CreateCovenantRequest {
        title: title.to_string(),
        covenant_type: CovenantType::Financial,
        due_date: date(2025, 3, 31),
        status: Some(status),
        value: Some("3.2x".to_string()),
        threshold: Some("< 3.5x".to_string()),
        description: "Tested quarterly".to_string(),
        frequency: Some("Quarterly".to_string()),
        waiver_reason: None,
    }
}

fn status_request(status: CovenantStatus) -> UpdateCovenantStatusRequest {
    UpdateCovenantStatusRequest {
        status,
        value: None,
        waiver_reason: None,
    }
}

fn count_events(loan: &Loan, event_type: TimelineEventType) -> usize {
    loan.timeline_events
        .iter()
        .filter(|e| e.event_type == event_type)
        .count()
}

#[tokio::test]
async fn test_new_loan_starts_fully_compliant_with_created_event() {
    let service = service();
    let loan = service
        .create_loan(loan_request("Acme Corp"), None)
        .await
        .unwrap();

    assert_eq!(loan.compliance_score, 100);
    assert_eq!(loan.currency, "USD");
    assert!(loan.covenants.is_empty());
    assert_eq!(loan.timeline_events.len(), 1);
    assert_eq!(
        loan.timeline_events[0].event_type,
        TimelineEventType::LoanCreated
    );
}

#[tokio::test]
async fn test_rejects_maturity_before_start() {
    let service = service();
    let mut request = loan_request("Backwards Ltd");
    request.maturity_date = date(2023, 1, 1);

    let result = service.create_loan(request, None).await;
    assert!(matches!(result, Err(ApiError::ValidationError(_))));
}

#[tokio::test]
async fn test_one_at_risk_of_four_scores_75() {
    let service = service();
    let loan = service
        .create_loan(loan_request("Acme Corp"), None)
        .await
        .unwrap();

    for (title, status) in [
        ("Leverage Ratio", CovenantStatus::Compliant),
        ("Interest Cover", CovenantStatus::AtRisk),
        ("Annual Accounts", CovenantStatus::Upcoming),
        ("Capex Limit", CovenantStatus::Waived),
    ] {
        service
            .add_covenant(loan.id, covenant_request(title, status), OFFICER)
            .await
            .unwrap();
    }

    let loan = service.get_loan(loan.id).await.unwrap();
    assert_eq!(loan.covenants.len(), 4);
    assert_eq!(loan.compliance_score, 75);
    assert_eq!(count_events(&loan, TimelineEventType::CovenantAdded), 4);

    let stats = service.loan_stats(loan.id).await.unwrap();
    assert_eq!(stats.total_covenants, 4);
    assert_eq!(stats.at_risk_count, 1);
}

#[tokio::test]
async fn test_status_change_emits_one_event_and_rescores() {
    let service = service();
    let loan = service
        .create_loan(loan_request("Acme Corp"), None)
        .await
        .unwrap();
    let covenant = service
        .add_covenant(
            loan.id,
            covenant_request("Leverage Ratio", CovenantStatus::Compliant),
            OFFICER,
        )
        .await
        .unwrap();
    let before = service.get_loan(loan.id).await.unwrap().timeline_events.len();

    let response = service
        .change_covenant_status(
            covenant.id,
            UpdateCovenantStatusRequest {
                status: CovenantStatus::Breached,
                value: Some("3.9x".to_string()),
                waiver_reason: None,
            },
            OFFICER,
        )
        .await
        .unwrap();

    assert_eq!(response.previous_status, CovenantStatus::Compliant);
    assert_eq!(response.compliance_score, 0);
    assert_eq!(response.covenant.value.as_deref(), Some("3.9x"));
    let event = response.event.expect("status change event");
    assert_eq!(event.event_type, TimelineEventType::StatusChanged);
    assert_eq!(event.related_covenant_id, Some(covenant.id));

    let loan = service.get_loan(loan.id).await.unwrap();
    assert_eq!(loan.timeline_events.len(), before + 1);
    assert_eq!(loan.compliance_score, 0);
}

#[tokio::test]
async fn test_compliant_to_at_risk_without_reason() {
    let service = service();
    let loan = service
        .create_loan(loan_request("Acme Corp"), None)
        .await
        .unwrap();
    let covenant = service
        .add_covenant(
            loan.id,
            covenant_request("Leverage Ratio", CovenantStatus::Compliant),
            OFFICER,
        )
        .await
        .unwrap();

    let response = service
        .change_covenant_status(covenant.id, status_request(CovenantStatus::AtRisk), OFFICER)
        .await
        .unwrap();

    assert_eq!(
        response.event.map(|e| e.event_type),
        Some(TimelineEventType::StatusChanged)
    );
    assert!(!response.covenant.has_waiver());

    let loan = service.get_loan(loan.id).await.unwrap();
    assert_eq!(count_events(&loan, TimelineEventType::StatusChanged), 1);
    assert_eq!(count_events(&loan, TimelineEventType::WaiverGranted), 0);
}

#[tokio::test]
async fn test_unchanged_status_records_no_event() {
    let service = service();
    let loan = service
        .create_loan(loan_request("Acme Corp"), None)
        .await
        .unwrap();
    let covenant = service
        .add_covenant(
            loan.id,
            covenant_request("Leverage Ratio", CovenantStatus::Compliant),
            OFFICER,
        )
        .await
        .unwrap();
    let before = service.get_loan(loan.id).await.unwrap().timeline_events.len();

    let response = service
        .change_loan_covenant_status(
            loan.id,
            covenant.id,
            status_request(CovenantStatus::Compliant),
            OFFICER,
        )
        .await
        .unwrap();

    assert!(response.event.is_none());
    let loan = service.get_loan(loan.id).await.unwrap();
    assert_eq!(loan.timeline_events.len(), before);
}

#[tokio::test]
async fn test_waiver_fields_only_while_waived() {
    let service = service();
    let loan = service
        .create_loan(loan_request("Helios Energy"), None)
        .await
        .unwrap();
    let covenant = service
        .add_covenant(
            loan.id,
            covenant_request("DSCR", CovenantStatus::Breached),
            OFFICER,
        )
        .await
        .unwrap();

    let waived = service
        .change_covenant_status(
            covenant.id,
            UpdateCovenantStatusRequest {
                status: CovenantStatus::Waived,
                value: None,
                waiver_reason: Some("Seasonal revenue dip".to_string()),
            },
            OFFICER,
        )
        .await
        .unwrap();

    assert_eq!(waived.compliance_score, 100);
    assert_eq!(
        waived.covenant.waiver_reason.as_deref(),
        Some("Seasonal revenue dip")
    );
    assert_eq!(waived.covenant.waiver_approved_by.as_deref(), Some(OFFICER));
    assert!(waived.covenant.waiver_date.is_some());
    assert_eq!(
        waived.event.map(|e| e.event_type),
        Some(TimelineEventType::WaiverGranted)
    );

    let reinstated = service
        .change_covenant_status(covenant.id, status_request(CovenantStatus::AtRisk), OFFICER)
        .await
        .unwrap();
    assert!(!reinstated.covenant.has_waiver());
    assert_eq!(reinstated.compliance_score, 0);
}

#[tokio::test]
async fn test_waiver_without_reason_populates_all_fields() {
    let service = service();
    let loan = service
        .create_loan(loan_request("Helios Energy"), None)
        .await
        .unwrap();
    let covenant = service
        .add_covenant(
            loan.id,
            covenant_request("DSCR", CovenantStatus::Breached),
            OFFICER,
        )
        .await
        .unwrap();

    let waived = service
        .change_covenant_status(covenant.id, status_request(CovenantStatus::Waived), OFFICER)
        .await
        .unwrap();

    let stored = service.get_loan(loan.id).await.unwrap();
    let stored = &stored.covenants[0];
    assert_eq!(stored.waiver_reason.as_deref(), Some("Not specified"));
    assert!(stored.waiver_date.is_some());
    assert_eq!(stored.waiver_approved_by.as_deref(), Some(OFFICER));
    assert_eq!(waived.covenant.waiver_reason, stored.waiver_reason);
}

#[tokio::test]
async fn test_unknown_covenant_is_not_found() {
    let service = service();
    let result = service
        .change_covenant_status(Uuid::new_v4(), status_request(CovenantStatus::Breached), OFFICER)
        .await;
    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

#[tokio::test]
async fn test_manual_event_must_reference_own_covenant() {
    let service = service();
    let first = service
        .create_loan(loan_request("First Borrower"), None)
        .await
        .unwrap();
    let second = service
        .create_loan(loan_request("Second Borrower"), None)
        .await
        .unwrap();
    let foreign = service
        .add_covenant(
            second.id,
            covenant_request("Leverage Ratio", CovenantStatus::Compliant),
            OFFICER,
        )
        .await
        .unwrap();

    let request = CreateTimelineEventRequest {
        event_type: TimelineEventType::PaymentReceived,
        date: Some(date(2025, 2, 1)),
        title: "Quarterly interest received".to_string(),
        description: String::new(),
        related_covenant_id: Some(foreign.id),
        metadata: None,
    };
    let result = service.add_timeline_event(first.id, request.clone()).await;
    assert!(matches!(result, Err(ApiError::BadRequest(_))));

    let recorded = service
        .add_timeline_event(
            first.id,
            CreateTimelineEventRequest {
                related_covenant_id: None,
                ..request
            },
        )
        .await
        .unwrap();
    assert_eq!(recorded.date, date(2025, 2, 1));

    let timeline = service.timeline(first.id).await.unwrap();
    assert_eq!(timeline.len(), 2);
}

#[tokio::test]
async fn test_extraction_adds_upcoming_covenants_and_two_events() {
    let service = service();
    let loan = service
        .create_loan(loan_request("Acme Corp"), None)
        .await
        .unwrap();
    let events_before = loan.timeline_events.len();

    let extraction = ExtractionResult {
        confidence: 91,
        key_terms: KeyTerms::default(),
        extracted_covenants: vec![
            ProposedCovenant {
                title: "Maximum Leverage".to_string(),
                covenant_type: "Financial".to_string(),
                threshold: Some("< 4.0x".to_string()),
                frequency: Some("Quarterly".to_string()),
                description: "Total debt to EBITDA".to_string(),
            },
            ProposedCovenant {
                title: "Audited Financials".to_string(),
                covenant_type: "Something Else".to_string(),
                threshold: None,
                frequency: Some("Annual".to_string()),
                description: String::new(),
            },
        ],
        risk_factors: vec!["Customer concentration".to_string()],
        summary: "Senior secured term loan".to_string(),
    };

    let applied = service
        .apply_extraction(
            loan.id,
            ApplyExtractionRequest {
                extraction,
                filename: "credit_agreement.pdf".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(applied.added_covenant_ids.len(), 2);
    assert_eq!(applied.event_ids.len(), 2);
    assert_eq!(applied.compliance_score, 100);

    let loan = service.get_loan(loan.id).await.unwrap();
    assert_eq!(loan.covenants.len(), 2);
    assert!(loan
        .covenants
        .iter()
        .all(|c| c.status == CovenantStatus::Upcoming));
    assert_eq!(loan.covenants[1].covenant_type, CovenantType::Financial);
    assert_eq!(loan.timeline_events.len(), events_before + 2);

    let dna = service.loan_dna(loan.id).await.unwrap().expect("loan DNA");
    assert_eq!(dna.source_document, "credit_agreement.pdf");
    assert_eq!(dna.confidence, 91);

    // Both extraction events share a timestamp; the later append lists first
    let timeline = service.timeline(loan.id).await.unwrap();
    let newest: Vec<_> = timeline.iter().take(2).map(|e| e.id).collect();
    assert_eq!(
        newest,
        vec![applied.event_ids[1], applied.event_ids[0]]
    );
    assert_eq!(timeline[0].event_type, TimelineEventType::CovenantAdded);
    assert_eq!(timeline[1].event_type, TimelineEventType::DocumentUploaded);

    let stats = service.dashboard_stats().await.unwrap();
    assert_eq!(stats.recent_events[0].event.id, applied.event_ids[1]);
    assert_eq!(stats.recent_events[1].event.id, applied.event_ids[0]);
}

#[tokio::test]
async fn test_blank_currency_update_keeps_existing_code() {
    let service = service();
    let mut request = loan_request("Nordic Shipping");
    request.currency = Some("eur".to_string());
    let loan = service.create_loan(request, None).await.unwrap();
    assert_eq!(loan.currency, "EUR");

    let updated = service
        .update_loan(
            loan.id,
            UpdateLoanRequest {
                currency: Some("   ".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.currency, "EUR");

    let updated = service
        .update_loan(
            loan.id,
            UpdateLoanRequest {
                currency: Some(" gbp".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.currency, "GBP");
}

#[tokio::test]
async fn test_export_round_trips_every_covenant() {
    let service = service();
    let loan = service
        .create_loan(loan_request("Acme, Corp \"Holdings\""), None)
        .await
        .unwrap();

    let mut leverage = covenant_request("Leverage, Net \"Senior\" Ratio", CovenantStatus::AtRisk);
    leverage.value = Some("3.4x, rising".to_string());
    leverage.threshold = Some("< 3.5x \"net\"".to_string());
    leverage.description = "Tested quarterly\nagainst LTM EBITDA, \"adjusted\"".to_string();

    let mut reporting = covenant_request("Annual Accounts", CovenantStatus::Upcoming);
    reporting.covenant_type = CovenantType::Reporting;
    reporting.due_date = date(2025, 4, 30);
    reporting.value = None;
    reporting.threshold = None;
    reporting.description = "Within 120 days, audited".to_string();

    let mut insurance = covenant_request("Insurance\r\nCertificate", CovenantStatus::Waived);
    insurance.covenant_type = CovenantType::Affirmative;
    insurance.due_date = date(2024, 12, 31);
    insurance.description = String::new();

    for request in [leverage, reporting, insurance] {
        service.add_covenant(loan.id, request, OFFICER).await.unwrap();
    }

    let report = service.export_csv(loan.id).await.unwrap();
    assert!(report.filename.ends_with(".csv"));
    assert!(report.body.contains("\"Acme, Corp \"\"Holdings\"\"\""));

    let loan = service.get_loan(loan.id).await.unwrap();
    let expected: Vec<CovenantRow> = loan.covenants.iter().map(CovenantRow::from).collect();
    let rows = read_covenant_table(&report.body).unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows, expected);
    assert_eq!(rows[1].due_date, date(2025, 4, 30));
    assert_eq!(rows[2].description, None);
}

#[tokio::test]
async fn test_predictions_are_stored_and_feed_dashboard() {
    let service = service();
    let loan = service
        .create_loan(loan_request("Acme Corp"), None)
        .await
        .unwrap();
    service
        .add_covenant(
            loan.id,
            covenant_request("Leverage Ratio", CovenantStatus::AtRisk),
            OFFICER,
        )
        .await
        .unwrap();
    service
        .add_covenant(
            loan.id,
            covenant_request("Interest Cover", CovenantStatus::Compliant),
            OFFICER,
        )
        .await
        .unwrap();

    let report = service.refresh_predictions(loan.id).await.unwrap();
    assert_eq!(report.predictions.len(), 2);
    assert_eq!(service.predictions(loan.id).await.unwrap(), report.predictions);

    let stats = service.dashboard_stats().await.unwrap();
    assert_eq!(stats.total_loans, 1);
    assert_eq!(stats.total_covenants, 2);
    assert_eq!(stats.at_risk_covenants, 1);
    assert_eq!(stats.breached_covenants, 0);
    assert_eq!(stats.avg_score, 50);
    assert_eq!(stats.top_risks.len(), 1);
    assert_eq!(stats.top_risks[0].prediction.covenant_title, "Leverage Ratio");
    assert!(stats.recent_events.len() <= 5);
}

#[tokio::test]
async fn test_deleting_loan_removes_its_covenants() {
    let service = service();
    let loan = service
        .create_loan(loan_request("Short Lived"), None)
        .await
        .unwrap();
    let covenant = service
        .add_covenant(
            loan.id,
            covenant_request("Leverage Ratio", CovenantStatus::Compliant),
            OFFICER,
        )
        .await
        .unwrap();

    service.delete_loan(loan.id).await.unwrap();

    assert!(matches!(
        service.get_loan(loan.id).await,
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        service.get_covenant(covenant.id).await,
        Err(ApiError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_document_upload_records_hash_and_event() {
    let service = service();
    let loan = service
        .create_loan(loan_request("Acme Corp"), None)
        .await
        .unwrap();

    let document = service
        .upload_document(loan.id, "../Credit Agreement.txt", b"hello")
        .await
        .unwrap();

    assert_eq!(document.size_bytes, 5);
    assert_eq!(
        document.sha256,
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert!(document.stored_path.ends_with("Credit_Agreement.txt"));

    let loan = service.get_loan(loan.id).await.unwrap();
    assert_eq!(loan.documents.len(), 1);
    assert_eq!(count_events(&loan, TimelineEventType::DocumentUploaded), 1);

    let empty = service.upload_document(loan.id, "empty.pdf", b"").await;
    assert!(matches!(empty, Err(ApiError::BadRequest(_))));
}
