//! PostgreSQL repository tests
//!
//! Require a disposable database:
//! `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use coven_server::db::run_migrations;
use coven_server::models::{
    CovenantStatus, CovenantType, CreateCovenantRequest, CreateLoanRequest, TimelineEventType,
    UpdateCovenantStatusRequest,
};
use coven_server::repository::{LoanRepository, PgLoanRepository};
use coven_server::services::{LoanService, StatusBasedPredictor};

async fn pool() -> PgPool {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_loan_aggregate_round_trip() {
    let repository = Arc::new(PgLoanRepository::new(pool().await));
    let service = LoanService::new(
        repository.clone(),
        Arc::new(StatusBasedPredictor),
        std::env::temp_dir(),
    );

    let loan = service
        .create_loan(
            CreateLoanRequest {
                borrower: format!("Pg Borrower {}", Uuid::new_v4().simple()),
                amount: Decimal::new(1_250_000_050, 2),
                currency: Some("eur".to_string()),
                interest_rate: Decimal::new(475, 2),
                start_date: date(2024, 6, 1),
                maturity_date: date(2031, 6, 1),
                status: None,
                risk_summary: Some("Sponsor-backed".to_string()),
            },
            None,
        )
        .await
        .unwrap();

    let mut covenant_ids = Vec::new();
    for title in ["Leverage Ratio", "Interest Cover", "Liquidity"] {
        let covenant = service
            .add_covenant(
                loan.id,
                CreateCovenantRequest {
                    title: title.to_string(),
                    covenant_type: CovenantType::Financial,
                    due_date: date(2025, 6, 30),
                    status: Some(CovenantStatus::Compliant),
                    value: None,
                    threshold: Some("> 1.5x".to_string()),
                    description: String::new(),
                    frequency: Some("Quarterly".to_string()),
                    waiver_reason: None,
                },
                "Pg Tester",
            )
            .await
            .unwrap();
        covenant_ids.push(covenant.id);
    }

    service
        .change_covenant_status(
            covenant_ids[1],
            UpdateCovenantStatusRequest {
                status: CovenantStatus::Waived,
                value: Some("1.2x".to_string()),
                waiver_reason: Some("Acquisition integration".to_string()),
            },
            "Pg Tester",
        )
        .await
        .unwrap();

    let stored = repository.get(loan.id).await.unwrap().expect("stored loan");

    assert_eq!(stored.currency, "EUR");
    assert_eq!(stored.amount, Decimal::new(1_250_000_050, 2));
    assert_eq!(stored.interest_rate, Decimal::new(475, 2));
    let order: Vec<Uuid> = stored.covenants.iter().map(|c| c.id).collect();
    assert_eq!(order, covenant_ids);
    assert_eq!(stored.covenants[1].status, CovenantStatus::Waived);
    assert_eq!(
        stored.covenants[1].waiver_approved_by.as_deref(),
        Some("Pg Tester")
    );
    assert_eq!(stored.compliance_score, 100);

    let types: Vec<TimelineEventType> = stored
        .timeline_events
        .iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(types.first(), Some(&TimelineEventType::LoanCreated));
    assert_eq!(types.last(), Some(&TimelineEventType::WaiverGranted));
    assert_eq!(types.len(), 5);

    assert_eq!(
        repository
            .loan_id_for_covenant(covenant_ids[2])
            .await
            .unwrap(),
        Some(loan.id)
    );

    service.delete_loan(loan.id).await.unwrap();
    assert!(repository.get(loan.id).await.unwrap().is_none());
    assert!(repository
        .loan_id_for_covenant(covenant_ids[2])
        .await
        .unwrap()
        .is_none());
}
