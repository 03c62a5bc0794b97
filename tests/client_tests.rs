//! API client tests against a mocked backend

use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use coven_server::client::{ClientError, CovenClient};

fn tokens(access: &str, refresh: &str) -> Value {
    json!({
        "access": access,
        "refresh": refresh,
        "tokenType": "Bearer",
        "expiresIn": 900,
        "user": {
            "id": Uuid::new_v4(),
            "username": "jane",
            "email": "jane@bank.example",
            "name": "Jane Officer",
            "firstName": "Jane",
            "lastName": "Officer",
            "role": "Credit Officer",
            "department": "Leveraged Finance",
        }
    })
}

fn token_expired() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({
        "error": { "code": "TOKEN_EXPIRED", "message": "Token expired" }
    }))
}

#[tokio::test]
async fn test_login_stores_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_partial_json(json!({ "username": "jane" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("access-1", "refresh-1")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = CovenClient::new(&mock_server.uri()).unwrap();
    let response = client.login("jane", "correct-horse").await.unwrap();

    assert_eq!(response.user.name, "Jane Officer");
    assert_eq!(client.access_token().await.as_deref(), Some("access-1"));
}

#[tokio::test]
async fn test_expired_token_refreshes_once_and_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/loans"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(token_expired())
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_partial_json(json!({ "refresh": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("fresh", "refresh-2")))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/loans"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = CovenClient::new(&mock_server.uri()).unwrap();
    client.set_tokens("stale", "refresh-1").await;

    let loans = client.list_loans(None).await.unwrap();

    assert!(loans.is_empty());
    assert_eq!(client.access_token().await.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_second_expiry_is_not_retried_again() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/dashboard/stats"))
        .respond_with(token_expired())
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("fresh", "refresh-2")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = CovenClient::new(&mock_server.uri()).unwrap();
    client.set_tokens("stale", "refresh-1").await;

    let result = client.dashboard_stats().await;
    assert!(matches!(result, Err(ClientError::AuthExpired)));
}

#[tokio::test]
async fn test_rejected_refresh_clears_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/loans"))
        .respond_with(token_expired())
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": "UNAUTHORIZED", "message": "Refresh token expired" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = CovenClient::new(&mock_server.uri()).unwrap();
    client.set_tokens("stale", "refresh-1").await;

    let result = client.list_loans(None).await;
    assert!(matches!(result, Err(ClientError::AuthExpired)));
    assert!(client.access_token().await.is_none());
}

#[tokio::test]
async fn test_api_errors_are_decoded() {
    let mock_server = MockServer::start().await;
    let loan_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(format!("/api/loans/{}", loan_id)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "NOT_FOUND", "message": "Loan not found" }
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/loans"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "VALIDATION_ERROR", "message": "amount: must be greater than zero" }
        })))
        .mount(&mock_server)
        .await;

    let client = CovenClient::new(&mock_server.uri()).unwrap();
    client.set_tokens("token", "refresh").await;

    match client.get_loan(loan_id).await {
        Err(ClientError::NotFound(message)) => assert_eq!(message, "Loan not found"),
        other => panic!("unexpected result: {:?}", other.map(|l| l.id)),
    }

    let request = serde_json::from_value(json!({
        "borrower": "Zero Ltd",
        "amount": "0",
        "interestRate": "5",
        "startDate": "2024-01-15",
        "maturityDate": "2029-01-15",
    }))
    .unwrap();
    match client.create_loan(&request).await {
        Err(ClientError::Api { status, code, .. }) => {
            assert_eq!(status, 400);
            assert_eq!(code, "VALIDATION_ERROR");
        }
        other => panic!("unexpected result: {:?}", other.map(|l| l.id)),
    }
}

fn health_body(status: &str, database: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": status,
        "database": database,
        "version": "0.1.0",
    }))
}

#[tokio::test]
async fn test_wait_until_healthy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(health_body("healthy", "in-memory"))
        .mount(&mock_server)
        .await;

    let client = CovenClient::new(&mock_server.uri()).unwrap();
    let health = client.wait_until_healthy(Duration::from_millis(50)).await;
    assert_eq!(health.database, "in-memory");
}

#[tokio::test]
async fn test_wait_until_healthy_keeps_polling() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(health_body("unhealthy", "unreachable"))
        .up_to_n_times(3)
        .expect(3)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(health_body("healthy", "connected"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = CovenClient::new(&mock_server.uri()).unwrap();
    let health = client.wait_until_healthy(Duration::from_millis(10)).await;
    assert_eq!(health.database, "connected");
}

#[tokio::test]
async fn test_slow_health_poll_times_out_and_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(health_body("healthy", "stale").set_delay(Duration::from_secs(5)))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(health_body("healthy", "connected"))
        .mount(&mock_server)
        .await;

    let client = CovenClient::new(&mock_server.uri())
        .unwrap()
        .with_health_timeout(Duration::from_millis(200));

    let health = client
        .wait_until_healthy_within(Duration::from_secs(3), Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(health.database, "connected");
}

#[tokio::test]
async fn test_bounded_wait_reports_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(health_body("unhealthy", "unreachable"))
        .mount(&mock_server)
        .await;

    let client = CovenClient::new(&mock_server.uri()).unwrap();
    let result = client
        .wait_until_healthy_within(Duration::from_millis(200), Duration::from_millis(50))
        .await;
    assert!(matches!(result, Err(ClientError::Unavailable(_))));
}
